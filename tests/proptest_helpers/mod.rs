#![allow(dead_code)]

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use formdiff::client::VisionBackend;
use formdiff::source::{DocumentImage, ImageContent, ImageFormat};
use formdiff::ComparisonError;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(32);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 256;
    config
}

pub fn image_id_strategy() -> BoxedStrategy<String> {
    proptest::string::string_regex("f1042-[0-9]{4}\\.(png|jpg)")
        .expect("valid image id regex")
        .boxed()
}

/// Image lists of 2..=max (ids may repeat; repeats stay distinct images).
pub fn arb_images(max: usize) -> BoxedStrategy<Vec<DocumentImage>> {
    prop::collection::vec(image_id_strategy(), 2..=max)
        .prop_map(|ids| ids.into_iter().map(|id| image(&id)).collect())
        .boxed()
}

pub fn image(id: &str) -> DocumentImage {
    DocumentImage {
        id: id.to_string(),
        path: id.into(),
        content: ImageContent::Encoded {
            bytes: id.as_bytes().to_vec(),
            format: ImageFormat::Png,
        },
    }
}

/// Backend that sleeps a per-call delay before echoing the pair.
///
/// Delays are handed out in call order, so shuffling them changes which
/// request finishes first.
pub struct DelayedEcho {
    delays: Mutex<Vec<u64>>,
    fail_containing: Option<String>,
}

impl DelayedEcho {
    pub fn new(delays_ms: Vec<u64>) -> Self {
        Self {
            delays: Mutex::new(delays_ms),
            fail_containing: None,
        }
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_containing = Some(needle.to_string());
        self
    }
}

impl VisionBackend for DelayedEcho {
    fn compare(
        &self,
        first: &DocumentImage,
        second: &DocumentImage,
    ) -> Result<String, ComparisonError> {
        let delay = self
            .delays
            .lock()
            .expect("delay lock")
            .pop()
            .unwrap_or(0);
        thread::sleep(Duration::from_millis(delay));

        if let Some(needle) = &self.fail_containing {
            if first.id.contains(needle.as_str()) || second.id.contains(needle.as_str()) {
                return Err(ComparisonError::ServiceError(format!(
                    "injected failure for {}",
                    needle
                )));
            }
        }
        Ok(echo_answer(first, second))
    }

    fn model(&self) -> &str {
        "delayed-echo"
    }
}

pub fn echo_answer(first: &DocumentImage, second: &DocumentImage) -> String {
    format!("1. {} differs from {}", first.id, second.id)
}
