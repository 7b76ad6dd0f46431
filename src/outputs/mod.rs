//! Digest outputs: HTML email body, SMTP delivery and the JSON dump.
//!
//! - [`html`]: renders a [`Digest`](crate::models::Digest) to an HTML document and a plain-text part
//! - [`email`]: sends the rendered digest through an SMTP relay
//! - [`json`]: writes the digest to `{dir}/{date}/digest.json`

pub mod email;
pub mod html;
pub mod json;
