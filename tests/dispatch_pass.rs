//! Dispatch-pass behavior across passes, collector sets, and sandboxing.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokmap::testing::Tok;
use tokmap::{
    CanonicalToken, Collector, Dispatcher, EngineConfig, FailureKind, StructureIndex,
};

type CallLog = Rc<RefCell<Vec<(String, usize)>>>;

struct Recorder {
    name: String,
    interests: Vec<String>,
    log: CallLog,
    visits: usize,
}

impl Recorder {
    fn boxed(name: &str, interests: &[&str], log: &CallLog) -> Box<Self> {
        Box::new(Self {
            name: name.to_string(),
            interests: interests.iter().map(|s| s.to_string()).collect(),
            log: Rc::clone(log),
            visits: 0,
        })
    }
}

impl Collector for Recorder {
    fn name(&self) -> &str {
        &self.name
    }
    fn interests(&self) -> Vec<String> {
        self.interests.clone()
    }
    fn visit(
        &mut self,
        _token: &CanonicalToken,
        position: usize,
        _index: &StructureIndex,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.visits += 1;
        self.log.borrow_mut().push((self.name.clone(), position));
        Ok(())
    }
    fn finalize(&mut self) -> serde_json::Value {
        serde_json::json!({ "visits": self.visits })
    }
}

fn doc() -> StructureIndex {
    let tokens = [
        Tok::heading_open(1, 0),
        Tok::inline("Title"),
        Tok::heading_close(),
        Tok::open("paragraph_open"),
        Tok::inline("body"),
        Tok::close("paragraph_close"),
        Tok::fence("rust", 4, 6),
    ];
    StructureIndex::build(&tokens, &EngineConfig::default()).unwrap()
}

#[test]
fn overlapping_collector_sets_share_call_order() {
    let index = doc();

    let first_log: CallLog = Rc::new(RefCell::new(Vec::new()));
    let mut first = Dispatcher::new(&EngineConfig::default());
    first
        .register(Recorder::boxed("inline", &["inline"], &first_log))
        .unwrap();
    first
        .register(Recorder::boxed("fences", &["fence"], &first_log))
        .unwrap();
    first.run(&index).unwrap();

    let second_log: CallLog = Rc::new(RefCell::new(Vec::new()));
    let mut second = Dispatcher::new(&EngineConfig::default());
    second
        .register(Recorder::boxed("inline", &["inline"], &second_log))
        .unwrap();
    second
        .register(Recorder::boxed("headings", &["heading_open"], &second_log))
        .unwrap();
    second.run(&index).unwrap();

    let common = |log: &CallLog| -> Vec<(String, usize)> {
        log.borrow()
            .iter()
            .filter(|(name, _)| name == "inline")
            .cloned()
            .collect()
    };
    // The collector common to both sets saw the same tokens in the same
    // order, regardless of what else was registered.
    assert_eq!(common(&first_log), common(&second_log));
    assert_eq!(common(&first_log), vec![
        ("inline".to_string(), 1),
        ("inline".to_string(), 4),
    ]);
}

#[test]
fn one_index_serves_many_passes() {
    let index = doc();

    for _ in 0..3 {
        let log: CallLog = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(&EngineConfig::default());
        dispatcher
            .register(Recorder::boxed("fences", &["fence"], &log))
            .unwrap();
        let outcome = dispatcher.run(&index).unwrap();
        assert_eq!(outcome.findings["fences"], serde_json::json!({ "visits": 1 }));
        assert!(outcome.failures.is_empty());
    }
}

#[test]
fn predicate_and_readiness_gate_candidates() {
    struct Picky {
        visited: Vec<usize>,
    }
    impl Collector for Picky {
        fn name(&self) -> &str {
            "picky"
        }
        fn interests(&self) -> Vec<String> {
            vec!["fence".to_string()]
        }
        fn accepts(&self, token: &CanonicalToken) -> bool {
            token.info == "rust"
        }
        fn visit(
            &mut self,
            _token: &CanonicalToken,
            position: usize,
            _index: &StructureIndex,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.visited.push(position);
            Ok(())
        }
        fn finalize(&mut self) -> serde_json::Value {
            serde_json::json!(self.visited)
        }
    }

    struct NeverReady;
    impl Collector for NeverReady {
        fn name(&self) -> &str {
            "never_ready"
        }
        fn interests(&self) -> Vec<String> {
            vec!["fence".to_string()]
        }
        fn ready(&self) -> bool {
            false
        }
        fn visit(
            &mut self,
            _token: &CanonicalToken,
            _position: usize,
            _index: &StructureIndex,
        ) -> Result<(), Box<dyn std::error::Error>> {
            panic!("must never run")
        }
    }

    let tokens = [Tok::fence("rust", 0, 1), Tok::fence("python", 3, 4)];
    let index = StructureIndex::build(&tokens, &EngineConfig::default()).unwrap();

    let mut dispatcher = Dispatcher::new(&EngineConfig::default());
    dispatcher.register(Box::new(Picky { visited: Vec::new() })).unwrap();
    dispatcher.register(Box::new(NeverReady)).unwrap();

    let outcome = dispatcher.run(&index).unwrap();
    assert_eq!(outcome.findings["picky"], serde_json::json!([0]));
    assert!(outcome.failures.is_empty());
}

#[test]
fn collectors_can_query_the_index_mid_pass() {
    struct LinkTitles {
        titles: Vec<String>,
    }
    impl Collector for LinkTitles {
        fn name(&self) -> &str {
            "section_titles"
        }
        fn interests(&self) -> Vec<String> {
            vec!["fence".to_string()]
        }
        fn visit(
            &mut self,
            token: &CanonicalToken,
            _position: usize,
            index: &StructureIndex,
        ) -> Result<(), Box<dyn std::error::Error>> {
            let line = token.line_start().ok_or("fence without lines")?;
            let section = index.section_at(line).ok_or("fence outside sections")?;
            self.titles.push(section.title.clone());
            Ok(())
        }
        fn finalize(&mut self) -> serde_json::Value {
            serde_json::json!(self.titles)
        }
    }

    let index = doc();
    let mut dispatcher = Dispatcher::new(&EngineConfig::default());
    dispatcher
        .register(Box::new(LinkTitles { titles: Vec::new() }))
        .unwrap();
    let outcome = dispatcher.run(&index).unwrap();
    assert_eq!(outcome.findings["section_titles"], serde_json::json!(["Title"]));
}

#[test]
fn timed_out_collector_is_logged_once_and_pass_completes() {
    struct Stuck {
        slept: bool,
    }
    impl Collector for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }
        fn interests(&self) -> Vec<String> {
            vec!["inline".to_string()]
        }
        fn visit(
            &mut self,
            _token: &CanonicalToken,
            _position: usize,
            _index: &StructureIndex,
        ) -> Result<(), Box<dyn std::error::Error>> {
            if !self.slept {
                self.slept = true;
                std::thread::sleep(Duration::from_millis(1500));
            }
            Ok(())
        }
    }

    let tokens = [Tok::inline("a"), Tok::inline("b")];
    let index = StructureIndex::build(&tokens, &EngineConfig::default()).unwrap();

    let config = EngineConfig {
        collector_timeout_secs: 1,
        ..EngineConfig::default()
    };
    let log: CallLog = Rc::new(RefCell::new(Vec::new()));
    let mut dispatcher = Dispatcher::new(&config);
    dispatcher.register(Box::new(Stuck { slept: false })).unwrap();
    dispatcher
        .register(Recorder::boxed("healthy", &["inline"], &log))
        .unwrap();

    let outcome = dispatcher.run(&index).unwrap();

    let timeouts: Vec<_> = outcome
        .failures
        .iter()
        .filter(|f| f.kind == FailureKind::Timeout)
        .collect();
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0].collector, "stuck");
    assert_eq!(timeouts[0].position, 0);

    // Remaining tokens and collectors still ran.
    assert_eq!(log.borrow().len(), 2);
    assert!(outcome.findings.contains_key("stuck"));
}

#[test]
fn outcome_serializes_as_a_facts_bundle() {
    let index = doc();
    let log: CallLog = Rc::new(RefCell::new(Vec::new()));
    let mut dispatcher = Dispatcher::new(&EngineConfig::default());
    dispatcher
        .register(Recorder::boxed("inline", &["inline"], &log))
        .unwrap();

    let outcome = dispatcher.run(&index).unwrap();
    let bundle = serde_json::to_value(&outcome).unwrap();
    assert_eq!(bundle["findings"]["inline"]["visits"], 2);
    assert_eq!(bundle["failures"], serde_json::json!([]));
}
