// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod error;
pub mod parameters;

pub use error::Error;
