/// Realtime database REST client
///
/// The bin sensors write straight into a realtime JSON database, one
/// top-level node per bin:
///
/// ```text
/// {
///   "Quiboloy": { "distance(cm)": 14 },
///   "Market-2": {
///     "trashLevel": 95,
///     "gps": { "latitude": 14.6, "longitude": 121.0, "altitude": 9 }
///   }
/// }
/// ```
///
/// The whole tree is read with `GET {base}/.json`; simulated sensors write
/// with `PATCH {base}/{bin}.json`. An optional auth token is appended as
/// the `auth` query parameter. Every read returns the whole tree;
/// `ingest::watch` reduces successive reads to the bins that changed.

use std::time::Duration;

use crate::ingest::BinDataSource;
use crate::logging::{self, Component};
use crate::model::{BinError, BinSnapshot};

pub struct RealtimeFeed {
    client: reqwest::blocking::Client,
    base_url: String,
    auth: Option<String>,
}

impl RealtimeFeed {
    pub fn new(base_url: &str, auth: Option<&str>) -> Result<Self, BinError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BinError::Config(format!("feed client: {}", e)))?;

        Ok(RealtimeFeed {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: auth.map(String::from),
        })
    }

    /// URL of the JSON node at `path` ("" for the root).
    pub fn node_url(&self, path: &str) -> String {
        let url = format!("{}/{}.json", self.base_url, path);
        match &self.auth {
            Some(token) => format!("{}?auth={}", url, token),
            None => url,
        }
    }

    /// Ids of every bin currently in the feed.
    pub fn list_bins(&self) -> Result<Vec<String>, BinError> {
        Ok(self.poll()?.into_iter().map(|(bin, _)| bin).collect())
    }

    /// Overwrites the raw distance of one bin, as a sensor would.
    pub fn push_distance(&self, bin_id: &str, distance_cm: f64) -> Result<(), BinError> {
        let body = serde_json::json!({ "distance(cm)": distance_cm });
        let response = self
            .client
            .patch(self.node_url(bin_id))
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            return Err(BinError::Transient(format!(
                "feed write HTTP error: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl BinDataSource for RealtimeFeed {
    fn poll(&self) -> Result<Vec<(String, BinSnapshot)>, BinError> {
        let response = self
            .client
            .get(self.node_url(""))
            .header("Accept", "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(BinError::Transient(format!(
                "feed HTTP error: {}",
                response.status()
            )));
        }

        let tree: serde_json::Value = response.json()?;
        Ok(parse_tree(&tree))
    }
}

impl From<reqwest::Error> for BinError {
    fn from(e: reqwest::Error) -> Self {
        BinError::Transient(format!("HTTP request failed: {}", e))
    }
}

/// Splits the feed's root node into per-bin snapshots, ordered by bin id.
///
/// A `null` root (empty database) yields no bins. A bin node that is not a
/// well-formed snapshot is logged and yields an empty snapshot, so the bin
/// still shows up as having sent no usable signal this cycle.
pub fn parse_tree(tree: &serde_json::Value) -> Vec<(String, BinSnapshot)> {
    let Some(bins) = tree.as_object() else {
        if !tree.is_null() {
            logging::warn(Component::Source, None, "Feed root is not an object");
        }
        return Vec::new();
    };

    let mut snapshots: Vec<(String, BinSnapshot)> = bins
        .iter()
        .map(|(bin_id, node)| {
            let snapshot = serde_json::from_value::<BinSnapshot>(node.clone()).unwrap_or_else(|e| {
                logging::warn(
                    Component::Source,
                    Some(bin_id),
                    &format!("Malformed bin node: {}", e),
                );
                BinSnapshot::default()
            });
            (bin_id.clone(), snapshot)
        })
        .collect();
    snapshots.sort_by(|a, b| a.0.cmp(&b.0));
    snapshots
}

// ============================================================================
// Tests
// ============================================================================
