#[cfg(test)]
mod tests {
    use crate::{Context, Error, ResourceLimits, Vm};
    use boa_engine::job::{GenericJob, Job, JobExecutor};
    use boa_engine::JsNativeError;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;
    use tempfile::NamedTempFile;

    fn create_test_script(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn context() -> Context {
        let vm = Vm::new().unwrap();
        Context::new(&vm).unwrap()
    }

    #[test]
    fn test_eval_arithmetic() {
        let ctx = context();
        for (source, expected) in [("1 + 1", 2.0), ("6 * 7", 42.0), ("2 ** 10 - 24", 1000.0), ("(5 - 8) / 2", -1.5)] {
            assert_eq!(ctx.eval(source).unwrap().number_value(), Some(expected), "{source}");
        }
    }

    #[test]
    fn test_eval_error_carries_thrown_value() {
        let ctx = context();
        match ctx.eval("throw new TypeError('boom')") {
            Err(Error::Evaluation(thrown)) => {
                assert_eq!(thrown.get("message").unwrap().string_value().as_deref(), Some("boom"));
                let type_error = ctx.global().get("TypeError").unwrap();
                assert!(thrown.is_instance_of(&type_error).unwrap());
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn test_syntax_error_is_evaluation_error() {
        let ctx = context();
        assert!(matches!(ctx.eval("this is not valid javascript ))"), Err(Error::Evaluation(_))));
    }

    #[test]
    fn test_eval_with_this() {
        let ctx = context();
        let receiver = ctx.eval("({ name: 'receiver' })").unwrap();

        let name = ctx.eval_with_this("this.name", &receiver).unwrap();
        assert_eq!(name.string_value().as_deref(), Some("receiver"));

        // Declarations stay local to the evaluation
        ctx.eval_with_this("var local = 1", &receiver).unwrap();
        assert!(!ctx.global().has("local").unwrap());
    }

    #[test]
    fn test_eval_drains_microtasks() {
        let ctx = context();
        ctx.eval("var order = []; Promise.resolve().then(() => order.push('job')); order.push('sync')")
            .unwrap();

        let order = ctx.eval("order.join(',')").unwrap();
        assert_eq!(order.string_value().as_deref(), Some("sync,job"));
        assert!(!ctx.has_pending_jobs());
    }

    #[test]
    fn test_check_never_executes() {
        let ctx = context();
        assert!(ctx.check("globalThis.touched = true;"));
        assert!(!ctx.global().has("touched").unwrap());

        assert!(!ctx.check("function ("));
        assert!(!ctx.check_with_origin("let x = ;", Some("file:///broken.js"), 40));
        assert!(ctx.check_with_origin("let y = 1;", Some("file:///ok.js"), 1));
    }

    #[test]
    fn test_load_script() {
        let ctx = context();
        let script = create_test_script("var loaded = 'yes'; 40 + 2");

        let result = ctx.load_script(script.path()).unwrap();
        assert_eq!(result.number_value(), Some(42.0));
        assert_eq!(ctx.eval("loaded").unwrap().string_value().as_deref(), Some("yes"));
    }

    #[test]
    fn test_load_missing_script() {
        let ctx = context();
        let dir = tempfile::tempdir().unwrap();
        let result = ctx.load_script(dir.path().join("missing.js"));
        assert!(matches!(result, Err(Error::MissingResource(_))));
    }

    #[test]
    fn test_load_script_with_syntax_error() {
        let ctx = context();
        let script = create_test_script("this is not valid javascript ))");
        assert!(matches!(ctx.load_script(script.path()), Err(Error::Evaluation(_))));
    }

    #[test]
    fn test_contexts_have_separate_globals() {
        let vm = Vm::new().unwrap();
        let first = Context::new(&vm).unwrap();
        let second = Context::new(&vm).unwrap();

        first.eval("var shared = 1").unwrap();
        assert!(first.global().has("shared").unwrap());
        assert!(!second.global().has("shared").unwrap());
        assert!(first.shares_vm_with(&second));
        assert!(!first.ptr_eq(&second));
    }

    #[test]
    fn test_alias_shares_globals_and_counts_owners() {
        let vm = Vm::new().unwrap();
        assert_eq!(vm.ref_count(), 1);

        let ctx = Context::new(&vm).unwrap();
        assert_eq!(vm.ref_count(), 2);

        let alias = Context::alias(&ctx);
        assert_eq!(ctx.ref_count(), 2);
        assert!(alias.ptr_eq(&ctx));

        alias.eval("var fromAlias = 'hi'").unwrap();
        assert_eq!(ctx.eval("fromAlias").unwrap().string_value().as_deref(), Some("hi"));

        drop(alias);
        assert_eq!(ctx.ref_count(), 1);
        assert_eq!(ctx.eval("fromAlias").unwrap().string_value().as_deref(), Some("hi"));

        drop(ctx);
        assert_eq!(vm.ref_count(), 1);
    }

    #[test]
    fn test_vm_outlives_handle_through_context() {
        let ctx = {
            let vm = Vm::new().unwrap();
            Context::new(&vm).unwrap()
        };
        assert_eq!(ctx.vm().ref_count(), 1);
        assert_eq!(ctx.eval("'still alive'").unwrap().string_value().as_deref(), Some("still alive"));
    }

    #[test]
    fn test_construction_helpers() {
        let ctx = context();
        let array = ctx
            .array(&[ctx.number(1.0), ctx.string("two"), ctx.boolean(true), ctx.null()])
            .unwrap();
        assert_eq!(array.length(), Some(4));
        assert!(array.get_index(3).unwrap().is_null());

        let error = ctx.error("went wrong").unwrap();
        let error_ctor = ctx.global().get("Error").unwrap();
        assert!(error.is_instance_of(&error_ctor).unwrap());
        assert_eq!(error.get("message").unwrap().string_value().as_deref(), Some("went wrong"));

        let data = ctx.data([1u8, 2, 3]).unwrap();
        assert!(data.is_array_buffer());
        assert_eq!(data.byte_length(), Some(3));
    }

    #[test]
    fn test_uncaught_job_error_reaches_handler() {
        let ctx = context();
        let reported = Rc::new(RefCell::new(Vec::new()));
        {
            let reported = Rc::clone(&reported);
            ctx.set_exception_handler(move |origin, exception| {
                assert!(origin.is_some());
                let text = exception.and_then(|e| e.string_value()).unwrap_or_default();
                reported.borrow_mut().push(text);
            });
        }

        let jobs = Rc::clone(&ctx.inner.vm.inner.jobs);
        ctx.enter(|engine| {
            let job = GenericJob::new(
                |_| Err(JsNativeError::typ().with_message("job failed").into()),
                engine.realm().clone(),
            );
            jobs.enqueue_job(Job::GenericJob(job), engine);
        })
        .unwrap();

        ctx.run_jobs().unwrap();
        assert_eq!(*reported.borrow(), vec!["TypeError: job failed".to_string()]);

        // Without a handler the error is only logged
        ctx.clear_exception_handler();
        ctx.eval("1").unwrap();
        assert_eq!(reported.borrow().len(), 1);
    }

    #[test]
    fn test_job_hitting_runtime_limit_reaches_handler() {
        let ctx = context();
        let reported = Rc::new(RefCell::new(Vec::new()));
        {
            let reported = Rc::clone(&reported);
            ctx.set_exception_handler(move |_, exception| {
                let text = exception.and_then(|e| e.string_value()).unwrap_or_default();
                reported.borrow_mut().push(text);
            });
        }

        let jobs = Rc::clone(&ctx.inner.vm.inner.jobs);
        ctx.enter(|engine| {
            let job = GenericJob::new(
                |_| Err(JsNativeError::runtime_limit().with_message("too deep").into()),
                engine.realm().clone(),
            );
            jobs.enqueue_job(Job::GenericJob(job), engine);
        })
        .unwrap();

        ctx.run_jobs().unwrap();
        assert_eq!(*reported.borrow(), vec!["RuntimeLimit: too deep".to_string()]);
    }

    #[test]
    fn test_resource_limits_are_applied() {
        let limits = ResourceLimits::default().with_loop_iteration_limit(1_000);
        let vm = Vm::with_limits(limits).unwrap();
        let ctx = Context::new(&vm).unwrap();

        assert!(matches!(ctx.eval("for (;;) {}"), Err(Error::RuntimeLimit(_))));
        assert_eq!(ctx.eval("let n = 0; for (let i = 0; i < 10; i++) n++; n").unwrap().number_value(), Some(10.0));
    }

    #[test]
    fn test_unbounded_recursion_fails_under_default_limits() {
        let vm = Vm::new().unwrap();
        let ctx = Context::new(&vm).unwrap();

        let result = ctx.eval("(function f() { return f(); })()");
        match result {
            Err(Error::RuntimeLimit(message)) => assert!(!message.is_empty()),
            other => panic!("expected a runtime limit failure, got {other:?}"),
        }

        // The context stays usable afterwards
        assert_eq!(ctx.eval("1 + 1").unwrap().number_value(), Some(2.0));
    }

    #[test]
    fn test_runtime_limit_is_not_catchable_by_script() {
        let limits = ResourceLimits::default().with_recursion_limit(16);
        let vm = Vm::with_limits(limits).unwrap();
        let ctx = Context::new(&vm).unwrap();

        let result = ctx.eval("try { (function f() { return f(); })(); } catch (e) { 'caught' }");
        assert!(matches!(result, Err(Error::RuntimeLimit(_))));
    }

    #[test]
    fn test_check_reports_busy_engine() {
        let ctx = context();
        {
            let _driver = ctx.inner.vm.inner.engine.borrow_for_jobs().unwrap();
            assert!(matches!(ctx.try_check("1 + 1"), Err(Error::ContextBusy)));
            assert!(!ctx.check("1 + 1"));
        }
        assert!(ctx.try_check("1 + 1").unwrap());
        assert!(!ctx.try_check("1 +").unwrap());
        assert!(ctx.check("1 + 1"));
    }

    #[test]
    fn test_invalid_limits_are_rejected() {
        let limits = ResourceLimits::default().with_recursion_limit(0);
        assert!(matches!(Vm::with_limits(limits), Err(Error::InvalidLimits(_))));
    }
}
