//! Every program and run handle is released exactly once
//!
//! A scripted engine counts acquisitions and releases so the invariant can be
//! checked on completion, early abandonment, runtime errors, failed
//! compiles and the streaming transform.

use octofhir_jq::{
    Bindings, Diagnostic, DiagnosticSink, Engine, EngineValue, ErrorKind, HostValue, Jq, JqConfig,
    Pull, TransformOptions, TransformOutput,
};
use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::collections::VecDeque;

#[derive(Default)]
struct CountingEngine {
    programs_acquired: Cell<usize>,
    programs_released: Cell<usize>,
    runs_acquired: Cell<usize>,
    runs_released: Cell<usize>,
    pulls: Cell<usize>,
}

impl CountingEngine {
    fn assert_balanced(&self) {
        assert_eq!(self.programs_acquired.get(), self.programs_released.get());
        assert_eq!(self.runs_acquired.get(), self.runs_released.get());
    }
}

/// Program script: comma-separated steps, each a number, `err` or `inf`
struct Script(Vec<String>);

struct ScriptRun {
    steps: VecDeque<String>,
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl Engine for CountingEngine {
    type Program = Script;
    type Run = ScriptRun;

    fn compile(
        &self,
        source: &str,
        _bindings: &[(String, EngineValue)],
        sink: &mut dyn DiagnosticSink,
    ) -> Option<Script> {
        match source {
            "bad" => {
                sink.report(Diagnostic::error("error: bad program"));
                None
            }
            "half-bad" => {
                // hands back a program despite reporting an error
                bump(&self.programs_acquired);
                sink.report(Diagnostic::error("error: half bad"));
                Some(Script(Vec::new()))
            }
            _ => {
                bump(&self.programs_acquired);
                Some(Script(source.split(',').map(str::to_string).collect()))
            }
        }
    }

    fn begin_run(&self, program: &Script, _input: EngineValue) -> ScriptRun {
        bump(&self.runs_acquired);
        ScriptRun {
            steps: program.0.iter().cloned().collect(),
        }
    }

    fn pull(&self, run: &mut ScriptRun) -> Pull {
        bump(&self.pulls);
        match run.steps.front().map(String::as_str) {
            None => Pull::Done,
            Some("inf") => Pull::Value(EngineValue::number(0.0)),
            Some("err") => {
                run.steps.pop_front();
                Pull::Error(EngineValue::string("boom"))
            }
            Some(step) => {
                let value = step.parse().map(EngineValue::number).unwrap_or_else(|_| EngineValue::null());
                run.steps.pop_front();
                Pull::Value(value)
            }
        }
    }

    fn release_program(&self, _program: Script) {
        bump(&self.programs_released);
    }

    fn release_run(&self, _run: ScriptRun) {
        bump(&self.runs_released);
    }
}

fn jq() -> Jq<CountingEngine> {
    Jq::with_engine(CountingEngine::default(), JqConfig::default())
}

#[test]
fn test_completed_run_is_released() {
    let jq = jq();
    {
        let program = jq.compile("1,2,3", &Bindings::new()).unwrap();
        let outputs = program.apply(&HostValue::Null).unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(jq.engine().runs_released.get(), 1);
        assert_eq!(jq.engine().programs_released.get(), 0);
    }
    jq.engine().assert_balanced();
    assert_eq!(jq.engine().programs_acquired.get(), 1);
}

#[test]
fn test_abandoned_infinite_run_is_released() {
    let jq = jq();
    {
        let program = jq.compile("inf", &Bindings::new()).unwrap();
        let mut outputs = program.run(&HostValue::Null).unwrap();
        for _ in 0..5 {
            assert!(outputs.next().unwrap().is_ok());
        }
        assert_eq!(jq.engine().runs_released.get(), 0);
        drop(outputs);
        assert_eq!(jq.engine().runs_released.get(), 1);
        assert_eq!(jq.engine().pulls.get(), 5);
    }
    jq.engine().assert_balanced();
}

#[test]
fn test_first_pulls_once_and_releases() {
    let jq = jq();
    {
        let program = jq.compile("inf", &Bindings::new()).unwrap();
        program.first(&HostValue::Null).unwrap();
        assert_eq!(jq.engine().pulls.get(), 1);
        let err = program.one(&HostValue::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MultipleResults);
        assert_eq!(jq.engine().pulls.get(), 3);
    }
    jq.engine().assert_balanced();
    assert_eq!(jq.engine().runs_acquired.get(), 2);
}

#[test]
fn test_runtime_error_releases_the_run_once() {
    let jq = jq();
    {
        let program = jq.compile("1,err,2", &Bindings::new()).unwrap();
        let mut outputs = program.run(&HostValue::Null).unwrap();
        assert!(outputs.next().unwrap().is_ok());
        let err = outputs.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(jq.engine().runs_released.get(), 1);
        assert!(outputs.is_finished());
        assert!(outputs.next().is_none());
        drop(outputs);
        assert_eq!(jq.engine().runs_released.get(), 1);
    }
    jq.engine().assert_balanced();
}

#[test]
fn test_failed_compile_releases_any_program() {
    let jq = jq();
    let err = jq.compile("bad", &Bindings::new()).unwrap_err();
    assert_eq!(err.to_string(), "error: bad program\n1 compile error");
    let err = jq.compile("half-bad", &Bindings::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compile);
    jq.engine().assert_balanced();
    assert_eq!(jq.engine().programs_released.get(), 1);
}

#[test]
fn test_unconvertible_input_acquires_no_run() {
    let jq = jq();
    {
        let program = jq.compile("1", &Bindings::new()).unwrap();
        let mut map = octofhir_jq::HostMap::new();
        map.insert(octofhir_jq::MapKey::Bool(true), HostValue::Null);
        let err = program.run(&HostValue::Object(map)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(jq.engine().runs_acquired.get(), 0);
    }
    jq.engine().assert_balanced();
}

#[test]
fn test_first_output_transform_abandons_the_run_and_skips_later_records() {
    let jq = jq();
    {
        let program = jq.compile("inf", &Bindings::new()).unwrap();
        let options = TransformOptions::new().with_raw_input(true);
        let output = program
            .transform(&HostValue::from("1 2 3"), &options)
            .unwrap();
        assert_eq!(output, TransformOutput::Value(HostValue::Integer(0)));
        assert_eq!(jq.engine().pulls.get(), 1);
        assert_eq!(jq.engine().runs_acquired.get(), 1);
        assert_eq!(jq.engine().runs_released.get(), 1);
    }
    jq.engine().assert_balanced();
}

#[test]
fn test_multiple_output_transform_releases_every_run() {
    let jq = jq();
    {
        let program = jq.compile("1,2", &Bindings::new()).unwrap();
        let options = TransformOptions::new()
            .with_raw_input(true)
            .with_multiple_output(true);
        let output = program
            .transform(&HostValue::from("{} {} {}"), &options)
            .unwrap();
        assert_eq!(output.into_values().map(|values| values.len()), Some(6));
        assert_eq!(jq.engine().runs_acquired.get(), 3);
        assert_eq!(jq.engine().runs_released.get(), 3);
    }
    jq.engine().assert_balanced();
}

#[test]
fn test_multiple_output_transform_releases_the_run_that_failed() {
    let jq = jq();
    {
        let program = jq.compile("1,err,2", &Bindings::new()).unwrap();
        let options = TransformOptions::new()
            .with_raw_input(true)
            .with_multiple_output(true);
        let err = program
            .transform(&HostValue::from("1 2"), &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(jq.engine().pulls.get(), 2);
        assert_eq!(jq.engine().runs_acquired.get(), 1);
        assert_eq!(jq.engine().runs_released.get(), 1);
    }
    jq.engine().assert_balanced();
}
