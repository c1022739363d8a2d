//! Command implementations and terminal output.

pub mod addresses;
pub mod locations;
pub mod session;

use cartwheel_checkout::api::ApiError;
use cartwheel_checkout::{CheckoutError, Notice};
use cartwheel_core::LocationTier;
use serde::Serialize;
use thiserror::Error;

/// Errors that end a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Building the API client failed.
    #[error("Could not set up the API client: {0}")]
    Api(#[from] ApiError),

    #[error("{}", .0.user_message())]
    Checkout(#[from] CheckoutError),

    /// Result could not be rendered as JSON.
    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required flag was not given.
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    /// The command needs an account.
    #[error("This command needs an account; set CHECKOUT_OWNER_ID or pass --owner")]
    SignInRequired,

    /// Reference data could not be loaded.
    #[error("No {0} data available right now")]
    Unavailable(LocationTier),
}

/// Where command results go.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    result: &'a T,
    notices: &'a [Notice],
}

impl Output {
    pub const fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print a result, either as JSON or through the text renderer.
    #[allow(clippy::print_stdout)]
    pub fn emit<T: Serialize>(
        self,
        result: &T,
        notices: &[Notice],
        render: impl FnOnce(&T) -> String,
    ) -> Result<(), CommandError> {
        if self.json {
            let envelope = Envelope { result, notices };
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        } else {
            self.notices(notices);
            println!("{}", render(result));
        }
        Ok(())
    }

    /// Print queued notices.
    ///
    /// In JSON mode notices travel inside the envelope instead.
    #[allow(clippy::print_stderr)]
    pub fn notices(self, notices: &[Notice]) {
        if self.json {
            return;
        }
        for notice in notices {
            eprintln!("{notice}");
        }
    }
}

/// Render rows as a space-aligned table.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut lines = vec![render_row(&widths, headers.iter().copied())];
    lines.extend(
        rows.iter()
            .map(|row| render_row(&widths, row.iter().map(String::as_str))),
    );
    lines.join("\n")
}

fn render_row<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
