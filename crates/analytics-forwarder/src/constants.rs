// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Appended to the configured endpoint, followed by the scope id, to fetch the remote config.
pub const CONFIG_URL_SUFFIX: &str = "/bootstrap?scopeId=";
/// Base path of the per-category event report endpoints.
pub const EVENT_REPORT_ENDPOINT_PATH: &str = "/intake";

pub const DEFAULT_CONFIG_REFRESH_DELAY_MS: u64 = 300_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BUFFER_MAX_EVENTS: usize = 100;
pub const DEFAULT_BUFFER_MAX_BYTES: usize = 2_000_000;
pub const DEFAULT_LISTENER_HOST: &str = "127.0.0.1";
pub const DEFAULT_LISTENER_PORT: u16 = 8126;
