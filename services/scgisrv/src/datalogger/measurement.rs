//! Storing sampled values

use std::fmt;
use std::sync::Arc;

use chrono::Local;
use tracing::debug;

use crate::db::{Measurement, Repository};
use crate::error::Result;

/// A value read for one task target
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub nad: u32,
    pub variable: String,
    pub value: String,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}.{}={}", self.nad, self.variable, self.value)
    }
}

pub struct MeasurementHandler {
    repository: Arc<dyn Repository>,
}

impl MeasurementHandler {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    pub async fn on_new_data(&self, samples: &[Sample]) -> Result<()> {
        debug!("Measurement - {} variables", samples.len());
        let timestamp = Local::now().naive_local();
        let measurements: Vec<Measurement> = samples
            .iter()
            .map(|s| Measurement {
                nad: s.nad,
                tag: s.variable.clone(),
                value: s.value.clone(),
                timestamp,
            })
            .collect();
        self.repository.create_measurements(&measurements).await
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::db::InMemoryRepository;

    #[tokio::test]
    async fn test_samples_are_stored_with_one_timestamp() {
        let repo = Arc::new(InMemoryRepository::new());
        let handler = MeasurementHandler::new(repo.clone());
        let samples = vec![
            Sample {
                nad: 1000,
                variable: "counter".into(),
                value: "5".into(),
            },
            Sample {
                nad: 1001,
                variable: "totals[1]".into(),
                value: "7".into(),
            },
        ];
        handler.on_new_data(&samples).await.unwrap();

        let stored = repo.measurements();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].tag, "totals[1]");
        assert_eq!(stored[0].timestamp, stored[1].timestamp);
        assert_eq!(samples[0].to_string(), "c1000.counter=5");
    }
}
