//! Human-in-the-loop resume gate.
//!
//! When the browser lands on a verification/CAPTCHA page the agent suspends
//! and hands control to the operator. The operator solves the challenge in
//! the visible browser window, then presses Enter in the console to resume
//! (or Esc to abort the run).

use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use crossterm::tty::IsTty;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

/// What the agent was doing when it paused.
#[derive(Debug, Clone)]
pub struct PauseContext {
    /// `None` while still logging in.
    pub query: Option<String>,
    pub leads_so_far: usize,
    pub lead_goal: usize,
}

impl PauseContext {
    pub fn describe(&self) -> String {
        match &self.query {
            Some(q) => format!(
                "during search '{}' ({}/{} leads)",
                q, self.leads_so_far, self.lead_goal
            ),
            None => "during login".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error("operator cancelled the run")]
    Cancelled,

    #[error("failed to read operator input: {0}")]
    Input(String),
}

#[async_trait::async_trait]
pub trait OperatorGate: Send + Sync {
    /// Block until the operator resumes (`Ok`) or cancels.
    async fn await_resume(&self, ctx: &PauseContext) -> Result<(), OperatorError>;
}

/// Console prompt. Enter resumes, Esc cancels; without a TTY a line on
/// stdin resumes and EOF cancels.
#[derive(Debug, Default)]
pub struct ConsoleOperatorGate;

#[async_trait::async_trait]
impl OperatorGate for ConsoleOperatorGate {
    async fn await_resume(&self, ctx: &PauseContext) -> Result<(), OperatorError> {
        warn!("---! CAPTCHA / verification detected {} !---", ctx.describe());
        notify_desktop(ctx);

        if std::io::stdin().is_tty() {
            println!(
                "Please solve the verification in the browser window, then press [Enter] here to continue or [Esc] to abort."
            );
            tokio::task::spawn_blocking(wait_for_enter_or_esc)
                .await
                .map_err(|e| OperatorError::Input(e.to_string()))??;
        } else {
            println!("Please solve the verification in the browser window, then send a newline on stdin to continue.");
            let mut line = String::new();
            let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let n = stdin
                .read_line(&mut line)
                .await
                .map_err(|e| OperatorError::Input(e.to_string()))?;
            if n == 0 {
                return Err(OperatorError::Cancelled);
            }
        }

        info!("operator: resuming");
        Ok(())
    }
}

/// Restores cooked mode even when the wait loop bails out early.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self, OperatorError> {
        terminal::enable_raw_mode().map_err(|e| OperatorError::Input(e.to_string()))?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn wait_for_enter_or_esc() -> Result<(), OperatorError> {
    let _raw = RawModeGuard::enable()?;
    loop {
        if event::poll(Duration::from_millis(100))
            .map_err(|e| OperatorError::Input(format!("failed to poll terminal input: {}", e)))?
        {
            if let TermEvent::Key(key) = event::read()
                .map_err(|e| OperatorError::Input(format!("failed to read terminal input: {}", e)))?
            {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Enter => return Ok(()),
                    KeyCode::Esc => return Err(OperatorError::Cancelled),
                    // Raw mode swallows SIGINT.
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Err(OperatorError::Cancelled)
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(feature = "notify")]
fn notify_desktop(ctx: &PauseContext) {
    let _ = notify_rust::Notification::new()
        .summary("lead-scout: verification needed")
        .body(&format!(
            "A CAPTCHA appeared {}. Solve it in the browser, then press Enter in the console.",
            ctx.describe()
        ))
        .show();
}

#[cfg(not(feature = "notify"))]
fn notify_desktop(_ctx: &PauseContext) {}
