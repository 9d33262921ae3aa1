//! Latest-wins cursor sampling
//!
//! Cursor moves arrive much faster than anyone reads the label. Samples go
//! into a `watch` channel, which keeps only the newest value, and a
//! background task classifies whatever is newest when it gets to it.
//! Superseded samples are dropped without being classified.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::color::Rgb;
use crate::engine::{ClassificationEngine, Label};

pub struct Sampler {
    input: watch::Sender<Option<Rgb>>,
    output: watch::Receiver<Option<Label>>,
    worker: JoinHandle<()>,
}

impl Sampler {
    /// Start the classification task. Must be called inside a tokio runtime.
    pub fn spawn(engine: Arc<ClassificationEngine>) -> Self {
        let (input, mut samples) = watch::channel(None);
        let (labels, output) = watch::channel(None);

        let worker = tokio::spawn(async move {
            while samples.changed().await.is_ok() {
                let pixel = *samples.borrow_and_update();
                if let Some(pixel) = pixel {
                    labels.send_replace(Some(engine.label(pixel)));
                }
            }
            tracing::debug!("Sampler input closed, stopping");
        });

        Self {
            input,
            output,
            worker,
        }
    }

    /// Replace any pending sample with `pixel`
    pub fn submit(&self, pixel: Rgb) {
        self.input.send_replace(Some(pixel));
    }

    /// Most recently published label, if any sample has been classified
    pub fn latest(&self) -> Option<Label> {
        self.output.borrow().clone()
    }

    /// Receiver notified each time a new label is published
    pub fn subscribe(&self) -> watch::Receiver<Option<Label>> {
        self.output.clone()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, NO_MATCH_LABEL};
    use crate::source::BUILTIN_TABLE;
    use crate::table::{self, ReferenceTable};
    use std::time::Duration;

    async fn wait_for_pixel(sampler: &Sampler, pixel: Rgb) -> Label {
        let mut rx = sampler.subscribe();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|label| match label {
                Some(Label::Matched(c)) => c.pixel == pixel,
                Some(Label::Unavailable { pixel: p, .. }) => *p == pixel,
                None => false,
            }),
        )
        .await
        .expect("sampler did not publish in time")
        .expect("sampler stopped");
        (*result).clone().unwrap()
    }

    #[tokio::test]
    async fn test_latest_sample_wins() {
        let table = table::load("builtin", BUILTIN_TABLE).unwrap();
        let engine = Arc::new(ClassificationEngine::new(Arc::new(table), EngineConfig::default()));
        let sampler = Sampler::spawn(engine.clone());
        assert!(sampler.latest().is_none());

        for v in 0..=200u8 {
            sampler.submit(Rgb::new(v, 0, 0));
        }
        let last = Rgb::new(128, 128, 128);
        sampler.submit(last);

        let label = wait_for_pixel(&sampler, last).await;
        assert_eq!(label, engine.label(last));
        assert_eq!(sampler.latest(), Some(label));
    }

    #[tokio::test]
    async fn test_unavailable_label_is_published() {
        let engine = Arc::new(ClassificationEngine::new(
            Arc::new(ReferenceTable::empty("none")),
            EngineConfig::default(),
        ));
        let sampler = Sampler::spawn(engine);
        let pixel = Rgb::new(1, 2, 3);
        sampler.submit(pixel);

        let label = wait_for_pixel(&sampler, pixel).await;
        assert_eq!(label.text(), NO_MATCH_LABEL);
    }
}
