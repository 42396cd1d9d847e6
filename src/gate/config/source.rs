//! Configuration acquisition.
//!
//! The configuration document is fetched once at startup, either from a
//! local JSON file or from an HTTP endpoint returning the same document.
//!
use std::path::PathBuf;

use url::Url;

use crate::gate::config::GateConfig;
use crate::gate::error::{map_deserialization_error, Result};

/// Where the configuration document comes from.
///
#[derive(Clone, Debug)]
pub enum ConfigSource {
    /// A local JSON file.
    File(PathBuf),
    /// An HTTP endpoint returning the JSON document in its body.
    Http(Url),
}

impl ConfigSource {
    /// Fetches and decodes the configuration document.
    pub async fn load(&self) -> Result<GateConfig> {
        let content = match self {
            ConfigSource::File(path) => tokio::fs::read_to_string(path).await?,
            ConfigSource::Http(url) => {
                reqwest::get(url.clone())
                    .await?
                    .error_for_status()?
                    .text()
                    .await?
            }
        };
        serde_json::from_str(&content).map_err(|e| map_deserialization_error(e, &content))
    }
}
