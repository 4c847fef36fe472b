//! Blocking-run contract shared by the menu and its error overlay.
//!
//! A borrowed console-resource bundle plus a blocking `run` method, so the
//! menu's dispatch loop can drive any screen that implements `App`
//! uniformly.

use crate::error::AppError;
use uefi::proto::console::text::{Input, Output};

/// Outcome of a blocking app run.
pub enum AppResult {
    /// The app finished normally and control should return to its caller.
    Done,
    /// The app hit an error it could not recover from on its own.
    Error(AppError),
}

/// Borrowed console resources for a running app.
pub struct AppCtx<'a> {
    pub output: &'a mut Output,
    pub input: &'a mut Input,
}

/// A blocking, screen-owning app: the menu and its error overlay both
/// implement this so the menu's dispatch loop can run either uniformly.
pub trait App {
    fn run(&mut self, ctx: &mut AppCtx) -> AppResult;
}
