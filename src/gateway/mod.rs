//! Gateway to the remote analysis service.
//!
//! The workflow only depends on the [`AnalysisGateway`] trait; the HTTP
//! implementation lives in [`client`].

pub mod client;

use crate::error::GatewayResult;
use crate::models::AnalysisResult;
use async_trait::async_trait;

pub use client::{GatewayConfig, HttpGateway};

/// Stateless request forwarding to the analysis service.
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Submit one patient for the full three-agent analysis.
    ///
    /// A blank identifier fails with a validation error before any
    /// request is made. There are no retries.
    async fn submit_analysis(&self, patient_id: &str) -> GatewayResult<AnalysisResult>;

    /// Sample patient identifiers. Never fails: any error yields an empty list.
    async fn list_sample_ids(&self) -> Vec<String>;
}
