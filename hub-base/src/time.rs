// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Abstractions over time, so that timers can be paused in tests.
 */

pub use std::time::*;
pub use tokio::time as timer;
