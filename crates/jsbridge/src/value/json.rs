//! Conversions between [`Value`] and `serde_json::Value`.
//!
//! | JSON    | JavaScript |
//! |---------|------------|
//! | null    | null       |
//! | boolean | Boolean    |
//! | number  | Number     |
//! | string  | String     |
//! | array   | Array      |
//! | object  | Object     |
//!
//! Going the other way, `undefined`, functions and symbols become `null`
//! inside arrays and are skipped as object members, like `JSON.stringify`.
//! Non-finite numbers become `null`.

use crate::error::{Error, Result};
use crate::runtime::context::Context;
use crate::value::Value;
use boa_engine::{
    object::{builtins::JsArray, JsObject},
    property::PropertyKey,
    Context as Engine, JsResult, JsString, JsValue,
};
use serde_json::Value as JsonValue;

/// Cycles are cut off at this depth instead of overflowing the stack.
const MAX_DEPTH: usize = 128;

impl Context {
    /// Builds a JavaScript value from a JSON document.
    pub fn from_json(&self, json: &JsonValue) -> Result<Value> {
        let raw = self.try_enter(|engine| json_to_raw(json, engine))?;
        Ok(self.wrap(raw))
    }
}

impl Value {
    /// Converts this value to JSON.
    ///
    /// # Errors
    ///
    /// - `Error::Json` for cyclic structures or strings that are not valid UTF-16
    /// - `Error::Evaluation` if a getter throws while being read
    pub fn to_json(&self) -> Result<JsonValue> {
        if let Some(json) = primitive_to_json(self.as_js_value())? {
            return Ok(json);
        }
        let context = self.context()?;
        context.try_enter(|engine| raw_to_json(self.as_js_value(), 0, engine))?
    }
}

fn json_to_raw(json: &JsonValue, engine: &mut Engine) -> JsResult<JsValue> {
    Ok(match json {
        JsonValue::Null => JsValue::null(),
        JsonValue::Bool(b) => JsValue::new(*b),
        JsonValue::Number(n) => JsValue::new(n.as_f64().unwrap_or(f64::NAN)),
        JsonValue::String(s) => JsValue::new(JsString::from(s.as_str())),
        JsonValue::Array(items) => {
            let array = JsArray::new(engine);
            for item in items {
                let item = json_to_raw(item, engine)?;
                array.push(item, engine)?;
            }
            array.into()
        }
        JsonValue::Object(members) => {
            let object = JsObject::with_object_proto(engine.intrinsics());
            for (key, member) in members {
                let member = json_to_raw(member, engine)?;
                object.create_data_property_or_throw(JsString::from(key.as_str()), member, engine)?;
            }
            object.into()
        }
    })
}

/// `Ok(None)` means the value is an object and needs the engine.
fn primitive_to_json(value: &JsValue) -> Result<Option<JsonValue>> {
    if value.is_undefined() || value.is_null() || value.is_symbol() {
        return Ok(Some(JsonValue::Null));
    }
    if let Some(b) = value.as_boolean() {
        return Ok(Some(JsonValue::Bool(b)));
    }
    if let Some(n) = value.as_number() {
        let json = if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
            JsonValue::from(n as i64)
        } else {
            serde_json::Number::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
        };
        return Ok(Some(json));
    }
    if let Some(s) = value.as_string() {
        let s = s
            .to_std_string()
            .map_err(|e| Error::Json(format!("String is not valid UTF-16: {e:?}")))?;
        return Ok(Some(JsonValue::String(s)));
    }
    if value.is_bigint() {
        return Err(Error::Json("BigInt values cannot be represented as JSON".into()));
    }
    Ok(None)
}

/// Skipped as object members.
fn is_omitted(value: &JsValue) -> bool {
    value.is_undefined()
        || value.is_symbol()
        || value.as_object().is_some_and(|object| object.is_callable())
}

fn raw_to_json(value: &JsValue, depth: usize, engine: &mut Engine) -> JsResult<Result<JsonValue>> {
    match primitive_to_json(value) {
        Ok(Some(json)) => return Ok(Ok(json)),
        Ok(None) => {}
        Err(e) => return Ok(Err(e)),
    }
    let Some(object) = value.as_object() else {
        return Ok(Ok(JsonValue::Null));
    };
    if object.is_callable() {
        return Ok(Ok(JsonValue::Null));
    }
    if depth >= MAX_DEPTH {
        return Ok(Err(Error::Json(format!(
            "Nesting deeper than {MAX_DEPTH} levels (cyclic value?)"
        ))));
    }

    if object.is_array() {
        let array = JsArray::from_object(object.clone())?;
        let length = array.length(engine)?;
        let mut items = Vec::with_capacity(length as usize);
        for i in 0..length {
            let item = array.get(i, engine)?;
            match raw_to_json(&item, depth + 1, engine)? {
                Ok(json) => items.push(json),
                Err(e) => return Ok(Err(e)),
            }
        }
        return Ok(Ok(JsonValue::Array(items)));
    }

    let mut members = serde_json::Map::new();
    for key in object.own_property_keys(engine)? {
        let name = match &key {
            PropertyKey::String(s) => s.to_std_string_escaped(),
            PropertyKey::Index(i) => i.get().to_string(),
            PropertyKey::Symbol(_) => continue,
        };
        let member = object.get(key, engine)?;
        if is_omitted(&member) {
            continue;
        }
        match raw_to_json(&member, depth + 1, engine)? {
            Ok(json) => {
                members.insert(name, json);
            }
            Err(e) => return Ok(Err(e)),
        }
    }
    Ok(Ok(JsonValue::Object(members)))
}
