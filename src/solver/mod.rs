//! Solve-retry control loop for captcha challenges on a live page.

pub mod runner;
pub mod session;
pub mod state;

pub use runner::{CaptchaSolver, SolveAttempt, SolveReport};
pub use session::{wait_for_page_ready, BrowserSession, Selector, SessionError};
pub use state::{transition, Effect, Observation, SolveState};
