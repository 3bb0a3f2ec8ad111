//! # mailsweep-mime
//!
//! Turns a raw RFC 5322 message into the pieces a mailbox sync stores:
//! decoded subject and sender, the received timestamp, and one renderable
//! body.
//!
//! ## Features
//!
//! - **Header decoding**: RFC 2047 encoded words in subjects, senders and filenames
//! - **Date parsing**: RFC 2822 dates with their original UTC offset
//! - **Rich content**: HTML preferred over plain text, nested multiparts flattened
//! - **Charsets**: declared charset honoured, UTF-8 by default, bad bytes replaced
//! - **Attachments**: filenames collected and summarised under the body
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsweep_mime::parse_message;
//!
//! let raw = b"From: sender@example.com\r\n\
//!             Subject: Test\r\n\
//!             Date: Mon, 01 Jan 2024 10:00:00 +0000\r\n\
//!             Content-Type: text/plain\r\n\
//!             \r\n\
//!             Hello, World!";
//!
//! let message = parse_message(raw)?;
//! println!("Subject: {}", message.envelope.subject);
//! println!("Body: {}", message.content().render());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content;
mod error;
mod header;
mod message;

pub mod encoding;

pub use content::{BodyFormat, RichContent, extract_rich_content};
pub use error::{Error, Result};
pub use header::{Envelope, decode_encoded_words, parse_date};
pub use message::{ParsedMessage, parse_message};
