//! JSON fixtures describing an in-memory container

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QueryError, QueryResult};
use crate::model::QueryInfo;
use crate::routing::PartitionKeyRange;

use super::container::InMemoryContainer;

/// A range split applied once a number of page requests were served
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitInstruction {
    pub range_id: String,
    pub at: String,
    #[serde(default)]
    pub after_requests: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerFixture {
    pub resource_link: String,
    pub partition_key_ranges: Vec<PartitionKeyRange>,
    #[serde(default)]
    pub documents: Vec<Value>,
    /// Plan handed out by the gateway
    #[serde(default)]
    pub query_info: QueryInfo,
    #[serde(default)]
    pub splits: Vec<SplitInstruction>,
    #[serde(default)]
    pub page_charge: Option<f64>,
}

impl ContainerFixture {
    pub fn load(path: &Path) -> QueryResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            QueryError::configuration(format!("cannot read fixture {}: {}", path.display(), e))
        })?;
        let fixture: ContainerFixture = serde_json::from_str(&content)
            .map_err(|e| QueryError::configuration(format!("invalid fixture: {}", e)))?;
        fixture.validate()?;
        Ok(fixture)
    }

    pub fn validate(&self) -> QueryResult<()> {
        if self.partition_key_ranges.is_empty() {
            return Err(QueryError::configuration(
                "fixture must declare at least one partition key range",
            ));
        }
        for split in &self.splits {
            if !self.partition_key_ranges.iter().any(|r| r.id == split.range_id) {
                return Err(QueryError::configuration(format!(
                    "split targets unknown range {}",
                    split.range_id
                )));
            }
        }
        Ok(())
    }

    pub fn into_container(self) -> InMemoryContainer {
        let container = InMemoryContainer::new(self.resource_link, self.partition_key_ranges)
            .with_query_info(self.query_info);
        for document in self.documents {
            container.insert(document);
        }
        for split in &self.splits {
            container.schedule_split(&split.range_id, &split.at, split.after_requests);
        }
        if let Some(charge) = self.page_charge {
            container.set_page_charge(charge);
        }
        container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURE: &str = r#"{
        "resourceLink": "dbs/db/colls/c",
        "partitionKeyRanges": [
            {"id": "0", "minInclusive": "", "maxExclusive": "48"},
            {"id": "1", "minInclusive": "48", "maxExclusive": "FF"}
        ],
        "documents": [{"id": "a", "pk": "A"}, {"id": "z", "pk": "Z"}],
        "queryInfo": {"top": 1},
        "splits": [{"rangeId": "1", "at": "50", "afterRequests": 2}]
    }"#;

    #[test]
    fn test_load_fixture() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();

        let fixture = ContainerFixture::load(file.path()).unwrap();
        assert_eq!(fixture.documents.len(), 2);
        assert_eq!(fixture.query_info.top, Some(1));
        assert_eq!(fixture.splits[0].after_requests, 2);

        let container = fixture.into_container();
        assert_eq!(container.resource_link(), "dbs/db/colls/c");
        assert_eq!(container.live_ranges().len(), 2);
        assert_eq!(container.query_plan().query_info.top, Some(1));
    }

    #[test]
    fn test_split_of_unknown_range_rejected() {
        let fixture = ContainerFixture {
            resource_link: "dbs/db/colls/c".into(),
            partition_key_ranges: vec![PartitionKeyRange::full("0")],
            documents: vec![],
            query_info: QueryInfo::default(),
            splits: vec![SplitInstruction {
                range_id: "5".into(),
                at: "80".into(),
                after_requests: 0,
            }],
            page_charge: None,
        };
        assert!(fixture.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = ContainerFixture::load(Path::new("/nonexistent/fixture.json")).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Configuration);
    }
}
