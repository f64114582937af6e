//! Controller behavior against scripted in-memory doubles of every seam:
//! no browser, no inference server, no files.

use lead_scout::config::{FileConfig, RunConfig};
use lead_scout::features::lead_sink::LeadSink;
use lead_scout::features::operator::{OperatorError, OperatorGate, PauseContext};
use lead_scout::features::qualifier::{Qualifier, QualifierError};
use lead_scout::features::session_store::{SessionStore, StoreError};
use lead_scout::scraping::{BrowserDriver, DriverError};
use lead_scout::{
    AgentController, AgentError, Credentials, DateFilter, Decision, LeadRecord, Post, PostPage,
    RunOutcome,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_test::{assert_err, assert_ok};

type Shared<T> = Arc<Mutex<T>>;

fn shared<T>(v: T) -> Shared<T> {
    Arc::new(Mutex::new(v))
}

fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn post(id: &str, text: &str) -> Post {
    Post {
        id: id.to_string(),
        author: format!("author of {}", id),
        text: text.to_string(),
        posted: Some("2h".into()),
        query: String::new(),
    }
}

fn page(posts: Vec<Post>, has_more: bool) -> PostPage {
    PostPage { posts, has_more }
}

fn config(queries: &[&str], goal: i64, max_pages: usize) -> RunConfig {
    let file = FileConfig {
        queries: Some(queries.iter().map(|q| q.to_string()).collect()),
        lead_goal_count: Some(goal),
        max_pages_per_query: Some(max_pages),
        date_filter: Some("any".into()),
        ..Default::default()
    };
    RunConfig::build(&file, |_: &str| None).unwrap()
}

fn credentials() -> Credentials {
    Credentials {
        email: "agent@example.com".into(),
        password: "s3cret".into(),
    }
}

// ── Doubles ──────────────────────────────────────────────────────────────────

/// Every driver/operator interaction, in order.
type EventLog = Shared<Vec<String>>;

#[derive(Default)]
struct ScriptedDriver {
    log: EventLog,
    pages: HashMap<String, VecDeque<PostPage>>,
    failing_searches: HashSet<String>,
    /// Queries whose first `next_page` fails with a timeout.
    failing_pages: HashSet<String>,
    /// Queries whose first `next_page` finds the browser gone.
    closed_on_page: HashSet<String>,
    failing_login: bool,
    /// One entry consumed per `detect_anomaly` call; exhausted → `false`.
    anomalies: VecDeque<bool>,
    current: Option<String>,
}

impl ScriptedDriver {
    fn new(log: &EventLog) -> Self {
        Self {
            log: Arc::clone(log),
            ..Default::default()
        }
    }

    fn with_pages(mut self, query: &str, pages: Vec<PostPage>) -> Self {
        self.pages.insert(query.to_string(), pages.into());
        self
    }

    fn event(&self, e: impl Into<String>) {
        self.log.lock().unwrap().push(e.into());
    }
}

#[async_trait::async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn open_login(&mut self) -> Result<(), DriverError> {
        self.event("open_login");
        Ok(())
    }

    async fn submit_credentials(&mut self, _credentials: &Credentials) -> Result<(), DriverError> {
        self.event("submit_credentials");
        if self.failing_login {
            return Err(DriverError::Timeout("username field".into()));
        }
        Ok(())
    }

    async fn await_authenticated(&mut self) -> Result<(), DriverError> {
        self.event("authenticated");
        Ok(())
    }

    async fn search(&mut self, query: &str, _date_filter: DateFilter) -> Result<(), DriverError> {
        self.event(format!("search:{}", query));
        if self.failing_searches.contains(query) {
            return Err(DriverError::ElementNotFound {
                what: "search bar".into(),
                selector: "input".into(),
            });
        }
        self.current = Some(query.to_string());
        Ok(())
    }

    async fn next_page(&mut self) -> Result<PostPage, DriverError> {
        self.event("next_page");
        let query = self.current.clone().ok_or(DriverError::NoActiveSearch)?;
        if self.closed_on_page.contains(&query) {
            return Err(DriverError::Closed);
        }
        if self.failing_pages.contains(&query) {
            return Err(DriverError::Timeout("post containers".into()));
        }
        let next = self
            .pages
            .get_mut(&query)
            .and_then(|q| q.pop_front())
            .unwrap_or_default();
        let posts = next
            .posts
            .into_iter()
            .map(|mut p| {
                p.query = query.clone();
                p
            })
            .collect();
        Ok(PostPage {
            posts,
            has_more: next.has_more,
        })
    }

    async fn detect_anomaly(&mut self) -> Result<bool, DriverError> {
        let hit = self.anomalies.pop_front().unwrap_or(false);
        self.event(format!("detect:{}", hit));
        Ok(hit)
    }

    async fn close(&mut self) {
        self.event("close");
    }
}

/// Verdict by post text: texts containing "lead" qualify, "boom" fails.
struct ScriptedQualifier {
    calls: Shared<Vec<String>>,
    /// Raised after the first classification, if set.
    stop_after_first: Option<watch::Sender<bool>>,
}

impl ScriptedQualifier {
    fn new(calls: &Shared<Vec<String>>) -> Self {
        Self {
            calls: Arc::clone(calls),
            stop_after_first: None,
        }
    }
}

#[async_trait::async_trait]
impl Qualifier for ScriptedQualifier {
    async fn classify(&self, text: &str) -> Result<Decision, QualifierError> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(stop) = &self.stop_after_first {
            let _ = stop.send(true);
        }
        if text.contains("boom") {
            return Err(QualifierError::Timeout(Duration::from_secs(60)));
        }
        if text.contains("lead") {
            Ok(Decision::qualified("asks for a VA"))
        } else {
            Ok(Decision::not_qualified("self-promotion"))
        }
    }
}

struct ScriptedGate {
    log: EventLog,
    cancel: bool,
}

#[async_trait::async_trait]
impl OperatorGate for ScriptedGate {
    async fn await_resume(&self, ctx: &PauseContext) -> Result<(), OperatorError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("pause:{}", ctx.query.as_deref().unwrap_or("login")));
        if self.cancel {
            Err(OperatorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Ledger lines, shared so the test can read them after the run.
struct MemoryStore {
    lines: Shared<Vec<String>>,
    /// Id whose `mark_seen` fails.
    fail_on: Option<String>,
}

impl SessionStore for MemoryStore {
    fn load(&mut self) -> Result<HashSet<String>, StoreError> {
        Ok(self.lines.lock().unwrap().iter().cloned().collect())
    }

    fn mark_seen(&mut self, id: &str) -> Result<(), StoreError> {
        if self.fail_on.as_deref() == Some(id) {
            return Err(StoreError::MarkSeen {
                id: id.to_string(),
                path: PathBuf::from("seen.txt"),
                source: std::io::Error::other("read-only file system"),
            });
        }
        let mut lines = self.lines.lock().unwrap();
        if !lines.iter().any(|l| l == id) {
            lines.push(id.to_string());
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemorySink {
    records: Shared<Vec<LeadRecord>>,
    /// 1-based append that fails.
    fail_on: Option<usize>,
    attempts: usize,
}

impl LeadSink for MemorySink {
    fn append(&mut self, record: &LeadRecord) -> Result<(), StoreError> {
        self.attempts += 1;
        if self.fail_on == Some(self.attempts) {
            return Err(StoreError::AppendLead {
                post_id: record.post_id.clone(),
                path: PathBuf::from("leads.csv"),
                reason: "disk full".into(),
            });
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct Harness {
    log: EventLog,
    classified: Shared<Vec<String>>,
    seen: Shared<Vec<String>>,
    leads: Shared<Vec<LeadRecord>>,
    store_fail_on: Option<String>,
}

impl Harness {
    fn new(pre_seen: &[&str]) -> Self {
        Self {
            log: shared(Vec::new()),
            classified: shared(Vec::new()),
            seen: shared(pre_seen.iter().map(|s| s.to_string()).collect()),
            leads: shared(Vec::new()),
            store_fail_on: None,
        }
    }

    fn controller(
        &self,
        config: RunConfig,
        driver: ScriptedDriver,
        qualifier: ScriptedQualifier,
        cancel_on_pause: bool,
        sink_fail_on: Option<usize>,
    ) -> AgentController {
        AgentController::new(
            config,
            credentials(),
            Box::new(driver),
            Box::new(qualifier),
            Box::new(ScriptedGate {
                log: Arc::clone(&self.log),
                cancel: cancel_on_pause,
            }),
            Box::new(MemoryStore {
                lines: Arc::clone(&self.seen),
                fail_on: self.store_fail_on.clone(),
            }),
            Box::new(MemorySink {
                records: Arc::clone(&self.leads),
                fail_on: sink_fail_on,
                attempts: 0,
            }),
        )
    }

    fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_run_records_two_of_three_and_exhausts_queries() {
    init_logger();
    let h = Harness::new(&[]);
    let driver = ScriptedDriver::new(&h.log).with_pages(
        "hiring a VA",
        vec![page(
            vec![
                post("p1", "need a lead VA now"),
                post("p2", "I am a VA, hire me"),
                post("p3", "who can recommend a VA? lead"),
            ],
            false,
        )],
    );

    let summary = assert_ok!(
        h.controller(
            config(&["hiring a VA"], 5, 15),
            driver,
            ScriptedQualifier::new(&h.classified),
            false,
            None,
        )
        .run()
        .await
    );

    assert_eq!(summary.outcome, RunOutcome::QueriesExhausted);
    assert_eq!(summary.total_leads, 2);
    assert_eq!(*h.seen.lock().unwrap(), vec!["p1", "p2", "p3"]);

    let leads = h.leads.lock().unwrap();
    assert_eq!(leads.len(), 2);
    assert_eq!(leads[0].post_id, "p1");
    assert_eq!(leads[0].query, "hiring a VA");
    assert_eq!(leads[1].post_id, "p3");

    let q = &summary.queries[0];
    assert_eq!((q.pages, q.posts_received, q.classified, q.leads), (1, 3, 3, 2));
    assert_eq!(h.count("close"), 1);
}

#[tokio::test]
async fn pre_seen_posts_are_never_classified() {
    let h = Harness::new(&["p1", "p2"]);
    let driver = ScriptedDriver::new(&h.log).with_pages(
        "q",
        vec![page(
            vec![
                post("p1", "old lead"),
                post("p2", "old lead too"),
                post("p3", "fresh post"),
            ],
            false,
        )],
    );

    let summary = assert_ok!(
        h.controller(config(&["q"], 5, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    assert_eq!(*h.classified.lock().unwrap(), vec!["fresh post"]);
    assert_eq!(summary.queries[0].skipped_seen, 2);
    // Seen set only grows.
    let seen = h.seen.lock().unwrap();
    assert!(["p1", "p2", "p3"].iter().all(|id| seen.iter().any(|s| s == id)));
}

#[tokio::test]
async fn anomaly_pauses_then_resumes_same_query() {
    init_logger();
    let h = Harness::new(&[]);
    let mut driver = ScriptedDriver::new(&h.log).with_pages(
        "q",
        vec![
            page(vec![post("p1", "first")], true),
            page(vec![post("p2", "second")], false),
        ],
    );
    // login page, after submit, page 1, page 2 (challenge), re-check after resume
    driver.anomalies = VecDeque::from(vec![false, false, false, true, false]);

    let summary = assert_ok!(
        h.controller(config(&["q"], 5, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    let events = h.events();
    let paused_at = events
        .iter()
        .position(|e| e == "pause:q")
        .expect("operator was asked to resume");
    assert_eq!(events[paused_at - 1], "detect:true");
    // Nothing touches the page while paused; the first thing after resume is a re-check.
    assert_eq!(events[paused_at + 1], "detect:false");
    assert_eq!(events[paused_at + 2], "next_page");

    assert_eq!(h.count("search:q"), 1);
    assert_eq!(summary.queries.len(), 1);
    assert_eq!(summary.queries[0].pages, 2);
    assert_eq!(*h.classified.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn sink_failure_aborts_after_first_lead_is_persisted() {
    let h = Harness::new(&[]);
    let driver = ScriptedDriver::new(&h.log).with_pages(
        "q",
        vec![page(
            vec![post("p1", "lead one"), post("p2", "lead two"), post("p3", "lead three")],
            true,
        )],
    );

    let aborted = assert_err!(
        h.controller(config(&["q", "q2"], 10, 15), driver, ScriptedQualifier::new(&h.classified), false, Some(2))
            .run()
            .await
    );

    match &aborted.error {
        AgentError::Store(StoreError::AppendLead { post_id, .. }) => assert_eq!(post_id, "p2"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(aborted.last_query.as_deref(), Some("q"));
    assert_eq!(aborted.summary.total_leads, 1);
    assert_eq!(aborted.summary.outcome, RunOutcome::Aborted);

    assert_eq!(h.leads.lock().unwrap().len(), 1);
    assert_eq!(h.classified.lock().unwrap().len(), 2);
    assert_eq!(h.count("search:q2"), 0);
    assert_eq!(h.count("close"), 1);
}

#[tokio::test]
async fn no_classification_after_goal_is_met() {
    let h = Harness::new(&[]);
    let driver = ScriptedDriver::new(&h.log)
        .with_pages(
            "q1",
            vec![page(vec![post("p1", "lead a"), post("p2", "lead b")], true)],
        )
        .with_pages("q2", vec![page(vec![post("p3", "lead c")], false)]);

    let summary = assert_ok!(
        h.controller(config(&["q1", "q2"], 1, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    assert_eq!(summary.outcome, RunOutcome::GoalReached);
    assert_eq!(summary.total_leads, 1);
    assert_eq!(h.classified.lock().unwrap().len(), 1);
    assert_eq!(h.count("search:q2"), 0);
    // p2 was never examined, so it is not marked seen either.
    assert_eq!(*h.seen.lock().unwrap(), vec!["p1"]);
}

#[tokio::test]
async fn page_requests_are_capped_per_query() {
    let h = Harness::new(&[]);
    let endless = |prefix: &str| {
        (0..10)
            .map(|i| page(vec![post(&format!("{prefix}{i}"), "nothing here")], true))
            .collect::<Vec<_>>()
    };
    let driver = ScriptedDriver::new(&h.log)
        .with_pages("a", endless("a"))
        .with_pages("b", endless("b"));

    let summary = assert_ok!(
        h.controller(config(&["a", "b"], 5, 3), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    assert_eq!(h.count("next_page"), 6);
    assert!(summary.queries.iter().all(|q| q.pages == 3));
    assert_eq!(summary.outcome, RunOutcome::QueriesExhausted);
}

#[tokio::test]
async fn failed_search_skips_to_next_query() {
    let h = Harness::new(&[]);
    let mut driver = ScriptedDriver::new(&h.log).with_pages("good", vec![page(vec![post("p1", "lead")], false)]);
    driver.failing_searches.insert("broken".into());

    let summary = assert_ok!(
        h.controller(config(&["broken", "good"], 5, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    assert!(summary.queries[0].error.is_some());
    assert_eq!(summary.queries[0].pages, 0);
    assert_eq!(summary.queries[1].leads, 1);
    assert_eq!(summary.total_leads, 1);
}

#[tokio::test]
async fn qualifier_errors_count_as_not_qualified() {
    let h = Harness::new(&[]);
    let driver = ScriptedDriver::new(&h.log).with_pages(
        "q",
        vec![page(vec![post("p1", "boom lead"), post("p2", "lead")], false)],
    );

    let summary = assert_ok!(
        h.controller(config(&["q"], 5, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    assert_eq!(summary.queries[0].qualifier_failures, 1);
    assert_eq!(summary.total_leads, 1);
    assert_eq!(h.leads.lock().unwrap()[0].post_id, "p2");
    assert_eq!(h.seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_text_is_marked_seen_but_not_classified() {
    let h = Harness::new(&[]);
    let driver = ScriptedDriver::new(&h.log).with_pages(
        "q",
        vec![page(vec![post("p1", "   "), post("p2", "hello")], false)],
    );

    let summary = assert_ok!(
        h.controller(config(&["q"], 5, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    assert_eq!(summary.queries[0].skipped_empty, 1);
    assert_eq!(*h.classified.lock().unwrap(), vec!["hello"]);
    assert_eq!(*h.seen.lock().unwrap(), vec!["p1", "p2"]);
}

#[tokio::test]
async fn stop_signal_ends_run_after_current_post() {
    let h = Harness::new(&[]);
    let driver = ScriptedDriver::new(&h.log)
        .with_pages("q", vec![page(vec![post("p1", "lead"), post("p2", "lead")], true)])
        .with_pages("q2", vec![page(vec![post("p3", "lead")], false)]);

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut qualifier = ScriptedQualifier::new(&h.classified);
    qualifier.stop_after_first = Some(stop_tx);

    let summary = assert_ok!(
        h.controller(config(&["q", "q2"], 5, 15), driver, qualifier, false, None)
            .with_stop_signal(stop_rx)
            .run()
            .await
    );

    assert_eq!(summary.outcome, RunOutcome::Interrupted);
    // The interrupted post's writes completed.
    assert_eq!(h.leads.lock().unwrap().len(), 1);
    assert_eq!(*h.seen.lock().unwrap(), vec!["p1"]);
    assert_eq!(h.count("search:q2"), 0);
    assert_eq!(h.count("close"), 1);
}

#[tokio::test]
async fn operator_cancel_aborts_the_run() {
    let h = Harness::new(&[]);
    let mut driver = ScriptedDriver::new(&h.log);
    driver.anomalies = VecDeque::from(vec![true]);

    let aborted = assert_err!(
        h.controller(config(&["q"], 5, 15), driver, ScriptedQualifier::new(&h.classified), true, None)
            .run()
            .await
    );

    assert!(matches!(aborted.error, AgentError::Operator(OperatorError::Cancelled)));
    assert_eq!(aborted.last_query, None);
    assert_eq!(h.count("pause:login"), 1);
    assert_eq!(h.count("authenticated"), 0);
    assert_eq!(h.count("close"), 1);
}

#[tokio::test]
async fn login_failure_is_fatal_and_closes_the_browser() {
    let h = Harness::new(&[]);
    let mut driver = ScriptedDriver::new(&h.log);
    driver.failing_login = true;

    let aborted = assert_err!(
        h.controller(config(&["q"], 5, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    assert!(matches!(aborted.error, AgentError::Login(_)));
    assert_eq!(h.count("search:q"), 0);
    assert_eq!(h.events().last().map(String::as_str), Some("close"));
}

#[tokio::test]
async fn challenge_on_login_page_is_solved_before_typing() {
    let h = Harness::new(&[]);
    let mut driver = ScriptedDriver::new(&h.log);
    driver.anomalies = VecDeque::from(vec![true, false, false]);

    assert_ok!(
        h.controller(config(&["q"], 5, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    let events = h.events();
    assert_eq!(
        &events[..7],
        [
            "open_login",
            "detect:true",
            "pause:login",
            "detect:false",
            "submit_credentials",
            "detect:false",
            "authenticated",
        ]
    );
}

#[tokio::test]
async fn store_failure_aborts_before_classifying_that_post() {
    let mut h = Harness::new(&[]);
    h.store_fail_on = Some("p2".into());
    let driver = ScriptedDriver::new(&h.log)
        .with_pages(
            "q",
            vec![page(
                vec![post("p1", "lead one"), post("p2", "lead two"), post("p3", "lead three")],
                false,
            )],
        )
        .with_pages("q2", vec![page(vec![post("p4", "lead four")], false)]);

    let aborted = assert_err!(
        h.controller(config(&["q", "q2"], 10, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    match &aborted.error {
        AgentError::Store(StoreError::MarkSeen { id, .. }) => assert_eq!(id, "p2"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(aborted.summary.outcome, RunOutcome::Aborted);
    assert_eq!(aborted.summary.total_leads, 1);
    assert_eq!(aborted.last_query.as_deref(), Some("q"));

    assert_eq!(*h.classified.lock().unwrap(), vec!["lead one"]);
    assert_eq!(*h.seen.lock().unwrap(), vec!["p1"]);
    assert_eq!(h.leads.lock().unwrap().len(), 1);
    assert_eq!(h.count("search:q2"), 0);
    assert_eq!(h.count("close"), 1);
}

#[tokio::test]
async fn page_error_ends_only_that_query() {
    let h = Harness::new(&[]);
    let mut driver = ScriptedDriver::new(&h.log).with_pages("good", vec![page(vec![post("p1", "lead")], false)]);
    driver.failing_pages.insert("flaky".into());

    let summary = assert_ok!(
        h.controller(config(&["flaky", "good"], 5, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    assert_eq!(summary.outcome, RunOutcome::QueriesExhausted);
    assert!(summary.queries[0].error.as_deref().unwrap().contains("post containers"));
    assert_eq!(summary.queries[0].pages, 0);
    assert_eq!(summary.queries[1].leads, 1);
    assert_eq!(h.count("next_page"), 2);
}

#[tokio::test]
async fn closed_browser_aborts_the_run() {
    let h = Harness::new(&[]);
    let mut driver = ScriptedDriver::new(&h.log).with_pages("q2", vec![page(vec![post("p1", "lead")], false)]);
    driver.closed_on_page.insert("q".into());

    let aborted = assert_err!(
        h.controller(config(&["q", "q2"], 5, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .run()
            .await
    );

    assert!(matches!(aborted.error, AgentError::BrowserGone(DriverError::Closed)));
    assert_eq!(aborted.last_query.as_deref(), Some("q"));
    assert_eq!(h.count("search:q2"), 0);
    assert!(h.classified.lock().unwrap().is_empty());
    assert_eq!(h.count("close"), 1);
}

#[tokio::test]
async fn recorded_leads_meeting_goal_skip_login() {
    let h = Harness::new(&["old1", "old2"]);
    let driver = ScriptedDriver::new(&h.log).with_pages("q", vec![page(vec![post("p1", "lead")], false)]);

    let summary = assert_ok!(
        h.controller(config(&["q"], 2, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .with_recorded_leads(2)
            .run()
            .await
    );

    assert_eq!(summary.outcome, RunOutcome::GoalReached);
    assert_eq!((summary.prior_leads, summary.total_leads), (2, 2));
    assert!(summary.queries.is_empty());
    assert_eq!(h.count("open_login"), 0);
    assert!(h.classified.lock().unwrap().is_empty());
    assert_eq!(h.events(), vec!["close"]);
}

#[tokio::test]
async fn recorded_leads_count_toward_goal() {
    let h = Harness::new(&["old1"]);
    let driver = ScriptedDriver::new(&h.log).with_pages(
        "q",
        vec![page(vec![post("p1", "lead a"), post("p2", "lead b")], false)],
    );

    let summary = assert_ok!(
        h.controller(config(&["q"], 2, 15), driver, ScriptedQualifier::new(&h.classified), false, None)
            .with_recorded_leads(1)
            .run()
            .await
    );

    assert_eq!(summary.outcome, RunOutcome::GoalReached);
    assert_eq!((summary.prior_leads, summary.total_leads), (1, 2));
    assert_eq!(summary.queries[0].leads, 1);
    assert_eq!(*h.classified.lock().unwrap(), vec!["lead a"]);
    assert_eq!(h.leads.lock().unwrap().len(), 1);
}
