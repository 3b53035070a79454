//! Pipeline stages for turning an uploaded CV into a deliverable.
//!
//! Each submodule implements exactly one step of the flow.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ submit ──▶ poll ──▶ dispatch ──▶ { link | bytes | template }
//! (gate)    (base64)   (POST)     (GET×N)  (classify)
//! ```
//!
//! 1. [`input`]: hold the upload and validate media type and size
//! 2. [`encode`]: base64 for the request body, and signature-checked decode
//!    for binary results
//! 3. [`submit`]: start one remote workflow run
//! 4. [`poll`]: bounded polling until the run is terminal
//! 5. [`dispatch`]: classify the first output node and route it

pub mod dispatch;
pub mod encode;
pub mod input;
pub mod poll;
pub mod submit;
