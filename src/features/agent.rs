//! Agent controller: login, then for each query page through results,
//! qualify every novel post and record leads until the goal is met.
//!
//! The controller is the only owner of the running lead counter and the
//! in-memory seen set. Durable state goes through [`SessionStore`] and
//! [`LeadSink`]; a failure of either aborts the run.

use crate::core::config::RunConfig;
use crate::core::types::{Credentials, Decision, LeadRecord, Post, QuerySummary, RunOutcome, RunSummary};
use crate::features::lead_sink::LeadSink;
use crate::features::operator::{OperatorError, OperatorGate, PauseContext};
use crate::features::qualifier::Qualifier;
use crate::features::session_store::{SessionStore, StoreError};
use crate::scraping::driver::{BrowserDriver, DriverError};
use std::collections::HashSet;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Searching { query: String },
    /// `query` is `None` when the interruption came up during login.
    Paused { query: Option<String> },
    Completed,
    Aborted,
}

fn log_state(state: &ControllerState) {
    info!("agent_state={:?}", state);
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("login failed: {0}")]
    Login(#[source] DriverError),

    #[error("browser session ended: {0}")]
    BrowserGone(#[source] DriverError),

    #[error(transparent)]
    Operator(#[from] OperatorError),
}

/// Fatal end of a run, with everything collected up to the failure.
#[derive(Debug, thiserror::Error)]
#[error("run aborted: {error}")]
pub struct RunAborted {
    #[source]
    pub error: AgentError,
    /// Query being processed when the failure happened.
    pub last_query: Option<String>,
    pub summary: RunSummary,
}

/// Why a query's page loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryEnd {
    Exhausted,
    PageCap,
    GoalReached,
    Skipped,
    Interrupted,
}

#[derive(Debug, Default)]
struct Progress {
    queries: Vec<QuerySummary>,
    leads: usize,
}

pub struct AgentController {
    config: RunConfig,
    credentials: Credentials,
    driver: Box<dyn BrowserDriver>,
    qualifier: Box<dyn Qualifier>,
    operator: Box<dyn OperatorGate>,
    store: Box<dyn SessionStore>,
    sink: Box<dyn LeadSink>,
    stop: Option<watch::Receiver<bool>>,
    recorded_leads: usize,
    state: ControllerState,
}

impl AgentController {
    pub fn new(
        config: RunConfig,
        credentials: Credentials,
        driver: Box<dyn BrowserDriver>,
        qualifier: Box<dyn Qualifier>,
        operator: Box<dyn OperatorGate>,
        store: Box<dyn SessionStore>,
        sink: Box<dyn LeadSink>,
    ) -> Self {
        Self {
            config,
            credentials,
            driver,
            qualifier,
            operator,
            store,
            sink,
            stop: None,
            recorded_leads: 0,
            state: ControllerState::Idle,
        }
    }

    /// Observe `stop`; once it reads `true` the run ends at the next post
    /// or query boundary with [`RunOutcome::Interrupted`].
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Leads already in the output file from earlier runs. They count
    /// toward the goal, so a finished goal is not searched for again.
    pub fn with_recorded_leads(mut self, count: usize) -> Self {
        self.recorded_leads = count;
        self
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Execute the whole run. The browser is closed on every exit path.
    pub async fn run(mut self) -> Result<RunSummary, RunAborted> {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "agent: run {} started ({} queries, goal {} leads, date filter {})",
            run_id,
            self.config.queries.len(),
            self.config.lead_goal_count,
            self.config.date_filter
        );
        log_state(&self.state);

        let mut progress = Progress {
            leads: self.recorded_leads,
            ..Progress::default()
        };
        let result = self.drive(&mut progress).await;

        self.driver.close().await;
        let result = match (result, self.store.persist()) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(AgentError::from(e)),
            (Err(e), Err(p)) => {
                warn!("agent: seen-set persist after failure also failed: {}", p);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        };

        let lead_goal = self.config.lead_goal_count;
        let prior_leads = self.recorded_leads;
        let summary = |outcome| RunSummary {
            run_id: run_id.clone(),
            prior_leads,
            total_leads: progress.leads,
            lead_goal,
            elapsed: started.elapsed(),
            outcome,
            queries: progress.queries.clone(),
        };

        match result {
            Ok(outcome) => {
                self.transition(ControllerState::Completed);
                let summary = summary(outcome);
                info!(
                    "agent: finished ({:?}) with {}/{} leads, {} posts classified in {:.0}s",
                    summary.outcome,
                    summary.total_leads,
                    summary.lead_goal,
                    summary.total_classified(),
                    summary.elapsed.as_secs_f64()
                );
                Ok(summary)
            }
            Err(error) => {
                let last_query = progress.queries.last().map(|q| q.query.clone());
                self.transition(ControllerState::Aborted);
                tracing::error!(
                    "agent: aborted during {} with {} leads collected: {}",
                    last_query
                        .as_deref()
                        .map(|q| format!("query '{}'", q))
                        .unwrap_or_else(|| "login".to_string()),
                    progress.leads,
                    error
                );
                Err(RunAborted {
                    error,
                    last_query,
                    summary: summary(RunOutcome::Aborted),
                })
            }
        }
    }

    async fn drive(&mut self, progress: &mut Progress) -> Result<RunOutcome, AgentError> {
        let mut seen = self.store.load()?;
        info!("agent: {} posts already seen in earlier runs", seen.len());
        if progress.leads >= self.config.lead_goal_count {
            info!(
                "agent: {} leads already recorded, goal of {} met; nothing to do",
                progress.leads, self.config.lead_goal_count
            );
            return Ok(RunOutcome::GoalReached);
        }
        if progress.leads > 0 {
            info!(
                "agent: resuming at {}/{} leads from earlier runs",
                progress.leads, self.config.lead_goal_count
            );
        }

        info!("agent: logging in");
        self.driver.open_login().await.map_err(AgentError::Login)?;
        self.pause_while_anomalous(None, progress.leads).await?;
        self.driver
            .submit_credentials(&self.credentials)
            .await
            .map_err(AgentError::Login)?;
        self.pause_while_anomalous(None, progress.leads).await?;
        self.driver
            .await_authenticated()
            .await
            .map_err(AgentError::Login)?;

        let queries = self.config.queries.clone();
        for query in &queries {
            if progress.leads >= self.config.lead_goal_count {
                break;
            }
            if self.stopped() {
                return Ok(RunOutcome::Interrupted);
            }

            self.transition(ControllerState::Searching {
                query: query.clone(),
            });
            let mut stats = QuerySummary::new(query);
            let end = self
                .run_query(query, &mut seen, &mut stats, &mut progress.leads)
                .await;
            info!(
                "agent: query '{}' done: pages={} received={} seen={} empty={} classified={} leads={}",
                stats.query,
                stats.pages,
                stats.posts_received,
                stats.skipped_seen,
                stats.skipped_empty,
                stats.classified,
                stats.leads
            );
            progress.queries.push(stats);

            match end? {
                QueryEnd::Interrupted => return Ok(RunOutcome::Interrupted),
                QueryEnd::GoalReached => break,
                QueryEnd::Exhausted | QueryEnd::PageCap | QueryEnd::Skipped => {}
            }
        }

        if progress.leads >= self.config.lead_goal_count {
            info!("🎉 agent: lead goal of {} reached", self.config.lead_goal_count);
            Ok(RunOutcome::GoalReached)
        } else {
            info!(
                "agent: all searches processed; found {}/{} leads",
                progress.leads, self.config.lead_goal_count
            );
            Ok(RunOutcome::QueriesExhausted)
        }
    }

    async fn run_query(
        &mut self,
        query: &str,
        seen: &mut HashSet<String>,
        stats: &mut QuerySummary,
        leads: &mut usize,
    ) -> Result<QueryEnd, AgentError> {
        info!("--- starting search for: {} ---", query);
        if let Err(e) = self.driver.search(query, self.config.date_filter).await {
            if matches!(e, DriverError::Closed) {
                return Err(AgentError::BrowserGone(e));
            }
            warn!("agent: search '{}' failed, moving to next query: {}", query, e);
            stats.error = Some(e.to_string());
            return Ok(QueryEnd::Skipped);
        }

        for _ in 0..self.config.max_pages_per_query {
            if self.stopped() {
                return Ok(QueryEnd::Interrupted);
            }
            self.pause_while_anomalous(Some(query), *leads).await?;

            let page = match self.driver.next_page().await {
                Ok(page) => page,
                Err(DriverError::Closed) => return Err(AgentError::BrowserGone(DriverError::Closed)),
                Err(e) => {
                    warn!("agent: reading results for '{}' failed, moving to next query: {}", query, e);
                    stats.error = Some(e.to_string());
                    return Ok(QueryEnd::Skipped);
                }
            };
            stats.pages += 1;
            stats.posts_received += page.posts.len();

            for post in &page.posts {
                if *leads >= self.config.lead_goal_count {
                    return Ok(QueryEnd::GoalReached);
                }
                if self.stopped() {
                    return Ok(QueryEnd::Interrupted);
                }
                self.process_post(post, seen, stats, leads).await?;
            }

            if *leads >= self.config.lead_goal_count {
                return Ok(QueryEnd::GoalReached);
            }
            if !page.has_more {
                info!("agent: no new posts loaded; end of results for '{}'", query);
                return Ok(QueryEnd::Exhausted);
            }
        }

        info!(
            "agent: page limit ({}) reached for '{}'",
            self.config.max_pages_per_query, query
        );
        Ok(QueryEnd::PageCap)
    }

    async fn process_post(
        &mut self,
        post: &Post,
        seen: &mut HashSet<String>,
        stats: &mut QuerySummary,
        leads: &mut usize,
    ) -> Result<(), AgentError> {
        if seen.contains(&post.id) {
            stats.skipped_seen += 1;
            return Ok(());
        }

        self.store.mark_seen(&post.id)?;
        seen.insert(post.id.clone());
        info!("processing new post: {}", post.id);

        if post.text.trim().is_empty() {
            info!("skipping post {} due to empty text", post.id);
            stats.skipped_empty += 1;
            return Ok(());
        }

        stats.classified += 1;
        let decision = match self.qualifier.classify(&post.text).await {
            Ok(d) => d,
            Err(e) => {
                warn!("qualifier failed for {}; treating as not a lead: {}", post.id, e);
                stats.qualifier_failures += 1;
                Decision::not_qualified(format!("qualifier error: {}", e))
            }
        };

        if !decision.is_qualified {
            info!("post is not a lead: {}", decision.rationale);
            return Ok(());
        }

        let record = LeadRecord::from_post(post, &decision, self.config.excerpt_max_chars);
        self.sink.append(&record)?;
        *leads += 1;
        stats.leads += 1;
        info!(
            "🎯 [LEAD FOUND] ({}/{}) author: {}, reason: {}",
            leads, self.config.lead_goal_count, post.author, decision.rationale
        );
        Ok(())
    }

    /// Hand control to the operator for as long as the page shows an
    /// interruption. Re-checked after every resume.
    async fn pause_while_anomalous(&mut self, query: Option<&str>, leads: usize) -> Result<(), AgentError> {
        loop {
            let anomalous = match self.driver.detect_anomaly().await {
                Ok(b) => b,
                Err(DriverError::Closed) => return Err(AgentError::BrowserGone(DriverError::Closed)),
                Err(e) => {
                    warn!("agent: anomaly check failed, assuming none: {}", e);
                    false
                }
            };
            if !anomalous {
                return Ok(());
            }

            let resume_to = self.state.clone();
            self.transition(ControllerState::Paused {
                query: query.map(str::to_string),
            });
            let ctx = PauseContext {
                query: query.map(str::to_string),
                leads_so_far: leads,
                lead_goal: self.config.lead_goal_count,
            };
            self.operator.await_resume(&ctx).await?;
            self.transition(resume_to);
        }
    }

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            self.state = next;
            log_state(&self.state);
        }
    }

    fn stopped(&self) -> bool {
        let hit = self.stop.as_ref().map(|rx| *rx.borrow()).unwrap_or(false);
        if hit {
            warn!("agent: stop requested");
        }
        hit
    }
}
