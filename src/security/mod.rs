// Copyright 2025 Cadence Labs
// SPDX-License-Identifier: Apache-2.0

//! Security module.
//!
//! Provides:
//! - Input validation (identifiers, LinkedIn message bounds, download path
//!   confinement)
//! - Webhook signature computation and constant-time verification

pub mod signature;
pub mod validation;

pub use signature::{compute_signature, verify_signature, SignatureError};
pub use validation::{ValidationError, Validator};
