//! Rendering provider and typed page extraction for Parity
//!
//! This crate is the only place that talks to a browser. Everything above it
//! sees a [`RenderingProvider`] handing out [`PageHandle`]s, and queries pages
//! through the typed [`extract`] interface.
//!
//! # Features
//!
//! - **Provider abstraction**: `new_page`, `goto`, `wait_for_network_idle`,
//!   `evaluate`, `screenshot`, `close`
//! - **Scoped handles**: [`ScopedPage`] closes its page on every exit path
//! - **Chrome implementation**: [`ChromeProvider`] over the Chrome DevTools Protocol
//! - **Typed extraction**: computed styles, geometry, font inventory, counts
//!
//! # Example
//!
//! ```no_run
//! use parity_browser::{extract, BrowserConfig, ChromeProvider, ScopedPage};
//! use parity_core::Viewport;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = ChromeProvider::new(BrowserConfig::default());
//!     let page = ScopedPage::open(&provider, &Viewport::new("desktop", 1440, 900)).await?;
//!
//!     page.goto("http://localhost:4040/index.html").await?;
//!     page.wait_for_network_idle(Duration::from_secs(30)).await?;
//!
//!     match extract::computed_style(&*page, "header").await? {
//!         Some(style) => println!("header background: {}", style.background_color),
//!         None => println!("no header"),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`provider`]: Provider and page traits, scoped page guard
//! - [`browser`]: Chrome-backed provider
//! - [`screenshot`]: Full-page capture for Chrome tabs
//! - [`extract`]: Typed queries and boundary validation

pub mod browser;
pub mod extract;
pub mod provider;
pub mod screenshot;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

// Re-export commonly used types
pub use browser::{BrowserConfig, ChromeProvider};
pub use extract::{Extraction, Query};
pub use provider::{PageHandle, RenderingProvider, ScopedPage};
pub use screenshot::ScreenshotOptions;
