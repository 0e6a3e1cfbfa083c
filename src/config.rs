//! Runtime configuration, loaded from environment variables plus an
//! optional JSON config file for the label table, links, and signature.

use std::collections::HashMap;
use std::env;

use serde::Deserialize;
use tracing::info;

use crate::delivery::DeliveryMode;
use crate::error::ConfigError;
use crate::labels::LabelTable;

/// Everything a pipeline run needs besides credentials.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Address the pipeline writes as (the inbox owner).
    pub mailbox_address: String,
    pub delivery_mode: DeliveryMode,
    /// Recipient domains eligible for delivery. Empty disables the gate.
    pub domain_allowlist: Vec<String>,
    /// Where sensitive threads get forwarded for human review.
    pub stakeholder_address: Option<String>,
    /// Label id that triggered the run; removed when the run finishes.
    pub trigger_label_id: Option<String>,
    /// Label id marking threads the pipeline drafted a reply for.
    pub autodrafted_label_id: Option<String>,
    pub labels: LabelTable,
    pub signature_block: Option<String>,
    /// Named resource links injected into reply placeholders.
    pub links: HashMap<String, String>,
}

/// Shape of the optional JSON config file.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    labels: LabelTable,
    #[serde(default)]
    signature_block: Option<String>,
    #[serde(default)]
    links: HashMap<String, String>,
}

fn required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_domains(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

impl PipelineConfig {
    /// Load configuration from the environment.
    ///
    /// - `INBOX_PILOT_MAILBOX` (required): the inbox owner's address.
    /// - `INBOX_PILOT_MODE`: `draft` (default) or `autosend`.
    /// - `INBOX_PILOT_ALLOWED_DOMAINS`: comma-separated; empty allows all.
    /// - `INBOX_PILOT_STAKEHOLDER`: forward target for sensitive threads.
    /// - `INBOX_PILOT_TRIGGER_LABEL_ID`, `INBOX_PILOT_AUTODRAFTED_LABEL_ID`.
    /// - `INBOX_PILOT_CONFIG`: path to a JSON file with the label table,
    ///   signature block, and links.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mailbox_address = required("INBOX_PILOT_MAILBOX")?;

        let delivery_mode = match optional("INBOX_PILOT_MODE").as_deref() {
            None | Some("draft") => DeliveryMode::Draft,
            Some("autosend") => DeliveryMode::AutoSend,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "INBOX_PILOT_MODE".into(),
                    message: format!("expected 'draft' or 'autosend', got {other:?}"),
                });
            }
        };

        let domain_allowlist: Vec<String> = optional("INBOX_PILOT_ALLOWED_DOMAINS")
            .map(|raw| parse_domains(&raw))
            .unwrap_or_default();

        let (labels, signature_block, links) = match optional("INBOX_PILOT_CONFIG") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)?;
                let file: ConfigFile = serde_json::from_str(&raw)
                    .map_err(|e| ConfigError::ParseError(format!("{path}: {e}")))?;
                (file.labels, file.signature_block, file.links)
            }
            None => (LabelTable::default(), None, HashMap::new()),
        };

        info!(
            mailbox = mailbox_address,
            mode = ?delivery_mode,
            allowlist_domains = domain_allowlist.len(),
            "Loaded configuration"
        );

        Ok(Self {
            mailbox_address,
            delivery_mode,
            domain_allowlist,
            stakeholder_address: optional("INBOX_PILOT_STAKEHOLDER"),
            trigger_label_id: optional("INBOX_PILOT_TRIGGER_LABEL_ID"),
            autodrafted_label_id: optional("INBOX_PILOT_AUTODRAFTED_LABEL_ID"),
            labels,
            signature_block,
            links,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::labels::LabelCategory;

    #[test]
    fn config_file_parses_label_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "labels": {{
                    "funnel_stage": {{ "QUALIFIED_TO_BUY": "Label_24" }},
                    "classification": {{ "NOT_FROM_REAL_PERSON": "Label_5" }}
                }},
                "signature_block": "Jane\nCompany",
                "links": {{ "Case Study": "https://x.com/cs" }}
            }}"#
        )
        .unwrap();

        let raw = std::fs::read_to_string(file.path()).unwrap();
        let parsed: ConfigFile = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            parsed.labels.lookup(LabelCategory::FunnelStage, "qualified to buy"),
            Some("Label_24")
        );
        assert_eq!(
            parsed.labels.lookup(LabelCategory::Classification, "NOT_FROM_REAL_PERSON"),
            Some("Label_5")
        );
        assert_eq!(parsed.signature_block.as_deref(), Some("Jane\nCompany"));
        assert_eq!(parsed.links.get("Case Study").map(String::as_str), Some("https://x.com/cs"));
    }

    #[test]
    fn allowlist_parsing_trims_and_lowercases() {
        assert_eq!(parse_domains("BigCo.com, partner.io ,,"), ["bigco.com", "partner.io"]);
    }

    #[test]
    fn allowlist_empty_string_yields_no_domains() {
        assert!(parse_domains("").is_empty());
        assert!(parse_domains(" , ").is_empty());
    }

    #[test]
    fn config_file_defaults_are_empty() {
        let parsed: ConfigFile = serde_json::from_str("{}").unwrap();
        assert!(parsed.labels.0.is_empty());
        assert!(parsed.signature_block.is_none());
        assert!(parsed.links.is_empty());
    }
}
