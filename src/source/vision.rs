//! Vision-LLM source for scanned filings.
//!
//! Scanned statements have no usable text layer. This backend rasterises
//! every page with pdfium, sends each page image to a vision model for
//! transcription into Markdown, cleans the result and segments it exactly
//! like [`super::markdown::MarkdownSource`].
//!
//! A page that fails (render, encode or all LLM retries) becomes a document
//! warning. Only a document where every page failed is a [`SourceError`].
//!
//! ## Retry strategy
//!
//! Rate-limit and overload errors are transient under concurrent load. Each
//! page is retried with exponential backoff (`retry_backoff_ms * 2^attempt`)
//! and every call is bounded by `api_timeout_secs`.

use crate::config::VisionConfig;
use crate::error::SourceError;
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts::TRANSCRIBE_SYSTEM_PROMPT;
use crate::source::markdown::snapshot_from_pages;
use crate::source::pdfium::{bind_pdfium, bottom_band_text, footnote_lines, open_document};
use crate::source::snapshot::{DocumentSnapshot, SnapshotText};
use crate::source::{Document, DocumentSource};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Transcribes rasterised pages with a vision LLM.
pub struct VisionSource {
    config: VisionConfig,
    provider: OnceCell<Arc<dyn LLMProvider>>,
}

impl VisionSource {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            config,
            provider: OnceCell::new(),
        }
    }

    /// The provider is resolved on first use so that building the source
    /// never needs credentials.
    fn provider(&self) -> Result<Arc<dyn LLMProvider>, SourceError> {
        self.provider
            .get_or_try_init(|| resolve_provider(&self.config))
            .map(Arc::clone)
    }
}

impl std::fmt::Debug for VisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DocumentSource for VisionSource {
    fn name(&self) -> &str {
        "vision"
    }

    fn convert<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Box<dyn Document>, SourceError>> {
        async move {
            let provider = self.provider()?;
            let doc = transcribe_document(&provider, path, &self.config).await?;
            Ok(Box::new(doc) as Box<dyn Document>)
        }
        .boxed()
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the LLM provider, from most to least specific:
///
/// 1. a pre-built provider on the config;
/// 2. `provider_name` (+ `model`) through the provider factory;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. OpenAI when `OPENAI_API_KEY` is present;
/// 5. full auto-detection from the environment.
fn resolve_provider(config: &VisionConfig) -> Result<Arc<dyn LLMProvider>, SourceError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", model);
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| {
        SourceError::new(format!(
            "no vision LLM provider configured; set OPENAI_API_KEY or ANTHROPIC_API_KEY, or pass a provider name ({e})"
        ))
    })?;
    Ok(llm)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, SourceError> {
    ProviderFactory::create_llm_provider(name, model)
        .map_err(|e| SourceError::new(format!("LLM provider '{name}' not available: {e}")))
}

// ── Rendering ────────────────────────────────────────────────────────────

struct RenderedDocument {
    page_count: usize,
    /// `(page_number, image)`, 1-indexed.
    pages: Vec<(u32, DynamicImage)>,
    footnotes: Vec<(u32, String)>,
    warnings: Vec<String>,
}

async fn render_document(path: &Path, config: &VisionConfig) -> Result<RenderedDocument, SourceError> {
    let path = path.to_path_buf();
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();
    let footnotes = config
        .recover_footnotes
        .then(|| (config.footnote_band, config.footnote_markers.clone()));

    tokio::task::spawn_blocking(move || {
        render_blocking(&path, max_pixels, password.as_deref(), footnotes)
    })
    .await
    .map_err(|e| SourceError::new(format!("render task failed: {e}")))?
}

fn render_blocking(
    path: &Path,
    max_pixels: u32,
    password: Option<&str>,
    footnotes: Option<(f32, Vec<String>)>,
) -> Result<RenderedDocument, SourceError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, path, password)?;
    let pages = document.pages();
    let page_count = pages.len() as usize;
    info!("PDF loaded: {} pages", page_count);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut rendered = RenderedDocument {
        page_count,
        pages: Vec::with_capacity(page_count),
        footnotes: Vec::new(),
        warnings: Vec::new(),
    };

    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx as u32 + 1;
        match page.render_with_config(&render_config) {
            Ok(bitmap) => {
                let image = bitmap.as_image();
                debug!(
                    "Rendered page {} → {}x{} px",
                    page_num,
                    image.width(),
                    image.height()
                );
                rendered.pages.push((page_num, image));
            }
            Err(e) => {
                warn!("Page {}: rasterisation failed: {:?}", page_num, e);
                rendered
                    .warnings
                    .push(format!("page {page_num}: rasterisation failed: {e:?}"));
            }
        }

        if let Some((band, markers)) = footnotes.as_ref() {
            match bottom_band_text(&page, *band) {
                Ok(text) => rendered.footnotes.extend(
                    footnote_lines(&text, markers)
                        .into_iter()
                        .map(|note| (page_num, note)),
                ),
                Err(e) => debug!("Page {}: no text layer for footnotes: {:?}", page_num, e),
            }
        }
    }

    Ok(rendered)
}

/// Encode a rasterised page as a base64 PNG.
///
/// PNG keeps rendered digits crisp; `detail: "high"` asks the model to look
/// at the full-resolution tiles, which small table figures need.
fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

// ── Transcription ────────────────────────────────────────────────────────

/// Outcome of transcribing one page.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PageOutcome {
    page_num: u32,
    result: Result<String, String>,
}

async fn transcribe_document(
    provider: &Arc<dyn LLMProvider>,
    path: &Path,
    config: &VisionConfig,
) -> Result<DocumentSnapshot, SourceError> {
    let start = Instant::now();
    let rendered = render_document(path, config).await?;
    let mut warnings = rendered.warnings;

    let mut encoded = Vec::with_capacity(rendered.pages.len());
    for (page_num, image) in &rendered.pages {
        match encode_page(image) {
            Ok(data) => encoded.push((*page_num, data)),
            Err(e) => {
                warn!("Failed to encode page {}: {}", page_num, e);
                warnings.push(format!("page {page_num}: image encoding failed: {e}"));
            }
        }
    }
    drop(rendered.pages);

    let outcomes: Vec<PageOutcome> = stream::iter(encoded.into_iter().map(|(page_num, image)| {
        let provider = Arc::clone(provider);
        async move {
            let result = transcribe_page(&provider, page_num, image, config).await;
            PageOutcome { page_num, result }
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    let doc = assemble(rendered.page_count, outcomes, rendered.footnotes, warnings)?;
    info!(
        "Transcribed {} in {}ms: {} tables, {} texts",
        path.display(),
        start.elapsed().as_millis(),
        doc.tables.len(),
        doc.texts.len()
    );
    Ok(doc)
}

async fn transcribe_page(
    provider: &Arc<dyn LLMProvider>,
    page_num: u32,
    image: ImageData,
    config: &VisionConfig,
) -> Result<String, String> {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(TRANSCRIBE_SYSTEM_PROMPT);
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images("", vec![image]),
    ];
    let options = build_options(config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    let mut last_err = String::from("no attempt made");
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match tokio::time::timeout(call_timeout, provider.chat(&messages, Some(&options))).await {
            Ok(Ok(response)) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens",
                    page_num, response.prompt_tokens, response.completion_tokens
                );
                return Ok(response.content);
            }
            Ok(Err(e)) => {
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                last_err = e.to_string();
            }
            Err(_) => {
                warn!(
                    "Page {}: attempt {} timed out after {}s",
                    page_num,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = format!("timed out after {}s", config.api_timeout_secs);
            }
        }
    }

    Err(format!(
        "transcription failed after {} retries: {}",
        config.max_retries, last_err
    ))
}

fn build_options(config: &VisionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Delay before retry `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Turn page outcomes into a document, in page order.
fn assemble(
    page_count: usize,
    mut outcomes: Vec<PageOutcome>,
    footnotes: Vec<(u32, String)>,
    mut warnings: Vec<String>,
) -> Result<DocumentSnapshot, SourceError> {
    outcomes.sort_by_key(|o| o.page_num);

    let mut pages = Vec::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(markdown) => pages.push((Some(outcome.page_num), clean_markdown(&markdown))),
            Err(e) => errors.push(format!("page {}: {}", outcome.page_num, e)),
        }
    }

    if pages.is_empty() && page_count > 0 {
        warnings.extend(errors);
        return Err(SourceError::with_errors(
            "vision transcription failed for every page",
            warnings,
        ));
    }

    let mut doc = snapshot_from_pages(&pages);
    doc.page_count = Some(page_count);
    doc.footnotes = footnotes
        .into_iter()
        .map(|(page, note)| SnapshotText::new(note).on_page(page).labelled("footnote"))
        .collect();
    warnings.extend(errors);
    doc.warnings = warnings;
    Ok(doc)
}
