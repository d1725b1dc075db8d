// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_types::Device;

/// User-facing confirmations, owned by the presentation layer
#[async_trait]
pub trait PromptProvider: Send + Sync {
    /// Ask whether an unformatted device should be formatted
    async fn confirm_format(&self, device: &Device) -> bool;

    /// Ask for the passphrase of a locked device; empty means cancelled
    async fn ask_passphrase(&self, device: &Device) -> String;

    async fn show_error(&self, title: &str, message: &str);
}
