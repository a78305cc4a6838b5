// Copyright the blitz authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod long;
pub mod number;
pub mod short;
pub mod version_negotiation;
