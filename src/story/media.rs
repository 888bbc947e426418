//! Media generation for story documents. A failed generation never fails the
//! document: a placeholder file is written and the error is recorded on the
//! media entry instead.

use tracing::{info, warn};

use super::slug::media_filename;
use super::store::ArtifactStore;
use super::{MediaRecord, StoryDocument};
use crate::services::media::{ImageRequest, MediaError, MediaGenerator};

const MEDIA_EXTENSION: &str = "jpg";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptTemplate {
    Cinematic,
    Fantasy,
    Dramatic,
    Default,
}

impl PromptTemplate {
    /// Unknown template names fall back to `Default`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cinematic" => Self::Cinematic,
            "fantasy" => Self::Fantasy,
            "dramatic" => Self::Dramatic,
            _ => Self::Default,
        }
    }

    pub fn enhance(self, prompt: &str) -> String {
        match self {
            Self::Cinematic => format!(
                "cinematic shot of {prompt}, dramatic lighting, movie still, high quality, detailed"
            ),
            Self::Fantasy => format!(
                "fantasy art style, {prompt}, magical atmosphere, vibrant colors, detailed artwork"
            ),
            Self::Dramatic => format!(
                "dramatic scene of {prompt}, intense mood, dynamic composition, high contrast"
            ),
            Self::Default => prompt.to_string(),
        }
    }
}

/// File name a prompt will be stored under.
pub fn planned_filename(prompt: &str) -> String {
    media_filename(prompt, MEDIA_EXTENSION)
}

/// Generates one image for `prompt`, stores it next to the document's
/// `story.json` and appends a provenance record to `doc.media`. Returns the
/// appended record.
pub async fn generate_media(
    doc: &mut StoryDocument,
    prompt: &str,
    template: &str,
    generator: &dyn MediaGenerator,
    artifacts: &ArtifactStore,
) -> MediaRecord {
    let file = planned_filename(prompt);
    let slug = doc.slug();
    let request = ImageRequest::widescreen(PromptTemplate::parse(template).enhance(prompt));

    let record = match fetch_first(generator, &request).await {
        Ok((url, bytes)) => match artifacts.write_media(&slug, &file, &bytes) {
            Ok(path) => {
                info!(slug = %slug, file = %file, path = %path.display(), "downloaded media");
                MediaRecord {
                    prompt: prompt.to_string(),
                    template: template.to_string(),
                    file,
                    original_url: Some(url),
                    error: None,
                }
            }
            Err(e) => placeholder(artifacts, &slug, prompt, template, file, e.to_string()),
        },
        Err(e) => placeholder(artifacts, &slug, prompt, template, file, e.to_string()),
    };
    doc.media.push(record.clone());
    record
}

async fn fetch_first(
    generator: &dyn MediaGenerator,
    request: &ImageRequest,
) -> Result<(String, Vec<u8>), MediaError> {
    let urls = generator.generate_image(request).await?;
    let url = urls.into_iter().next().ok_or(MediaError::Empty)?;
    let bytes = generator.download(&url).await?;
    Ok((url, bytes))
}

fn placeholder(
    artifacts: &ArtifactStore,
    slug: &str,
    prompt: &str,
    template: &str,
    file: String,
    error: String,
) -> MediaRecord {
    warn!(slug = %slug, file = %file, err = %error, "media generation failed, writing placeholder");
    let body = format!("# Placeholder for: {prompt}\n# Template: {template}\n# Error: {error}");
    if let Err(e) = artifacts.write_media(slug, &file, body.as_bytes()) {
        warn!(slug = %slug, file = %file, err = %e, "failed to write media placeholder");
    }
    MediaRecord {
        prompt: prompt.to_string(),
        template: template.to_string(),
        file,
        original_url: None,
        error: Some(error),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every prompt it sees and serves fixed bytes.
    pub(crate) struct FakeMedia {
        pub fail: bool,
        pub prompts: Mutex<Vec<String>>,
    }

    impl FakeMedia {
        pub(crate) fn new(fail: bool) -> Self {
            Self {
                fail,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaGenerator for FakeMedia {
        async fn generate_image(&self, request: &ImageRequest) -> Result<Vec<String>, MediaError> {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(request.prompt.clone());
            if self.fail {
                return Err(MediaError::Api {
                    status: 500,
                    message: "backend down".into(),
                });
            }
            Ok(vec!["https://media.test/1.jpg".into()])
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>, MediaError> {
            Ok(vec![0xFF, 0xD8, 0xFF])
        }
    }

    #[test]
    fn templates_wrap_the_prompt() {
        assert_eq!(
            PromptTemplate::parse("fantasy").enhance("badger"),
            "fantasy art style, badger, magical atmosphere, vibrant colors, detailed artwork"
        );
        assert_eq!(PromptTemplate::parse("unknown").enhance("badger"), "badger");
    }

    #[tokio::test]
    async fn successful_generation_records_source_url() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let artifacts = ArtifactStore::new(tmp.path());
        let media = FakeMedia::new(false);
        let mut doc = StoryDocument::new("Media Test");

        let record = generate_media(&mut doc, "fantasy badger", "cinematic", &media, &artifacts).await;
        assert_eq!(record.file, "fantasy-badger.jpg");
        assert_eq!(record.original_url.as_deref(), Some("https://media.test/1.jpg"));
        assert!(record.error.is_none());
        let bytes = std::fs::read(tmp.path().join("media-test").join("fantasy-badger.jpg"))
            .expect("image");
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);
        assert!(media.prompts.lock().expect("lock")[0].starts_with("cinematic shot of fantasy badger"));
    }

    #[tokio::test]
    async fn failed_generation_leaves_placeholder_and_publishable_document() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let artifacts = ArtifactStore::new(tmp.path());
        let media = FakeMedia::new(true);
        let mut doc = StoryDocument::new("Broken Media");
        doc.add_scene("start").set_text("hello");

        let record = generate_media(&mut doc, "wise hamster", "fantasy", &media, &artifacts).await;
        assert!(record.error.as_deref().is_some_and(|e| e.contains("backend down")));

        let summary = artifacts.publish(&doc).expect("publish");
        assert_eq!(summary.media, 1);
        let body = std::fs::read_to_string(tmp.path().join("broken-media").join("wise-hamster.jpg"))
            .expect("placeholder");
        assert!(body.contains("# Error: "));
        let loaded = artifacts.load("broken-media").expect("load");
        assert!(loaded.media[0].error.is_some());
    }
}
