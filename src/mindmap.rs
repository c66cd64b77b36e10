//! Mind-map panel: feeds `#mindmap-code` into a diagram renderer and keeps the
//! zoom transform of `#mermaid-container` in sync.

use crate::fragments::{FragmentError, parse_fragment};
use crate::page::{Page, ids};
use async_trait::async_trait;
use kuchiki::NodeRef;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const ZOOM_STEP: f64 = 0.1;
const MIN_SCALE: f64 = 0.5;

#[derive(Debug, Error)]
pub enum DiagramError {
    #[error("page has no #{0} element")]
    MissingElement(&'static str),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error("diagram render failed: {0}")]
    Render(String),
}

/// Diagramming library hook, called after the source has been placed.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, source: &str) -> Result<(), DiagramError>;
}

/// Renderer that only records the diagram in the log.
#[derive(Clone, Default)]
pub struct LoggingDiagramRenderer;

#[async_trait]
impl DiagramRenderer for LoggingDiagramRenderer {
    async fn render(&self, source: &str) -> Result<(), DiagramError> {
        info!(lines = source.lines().count(), "mind-map rendered");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MindmapPanel {
    scale: f64,
}

impl Default for MindmapPanel {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl MindmapPanel {
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn zoom_in(&mut self, page: &Page) -> f64 {
        self.set_scale(page, self.scale + ZOOM_STEP)
    }

    pub fn zoom_out(&mut self, page: &Page) -> f64 {
        self.set_scale(page, (self.scale - ZOOM_STEP).max(MIN_SCALE))
    }

    pub fn reset(&mut self, page: &Page) -> f64 {
        self.set_scale(page, 1.0)
    }

    fn set_scale(&mut self, page: &Page, scale: f64) -> f64 {
        self.scale = (scale * 10.0).round() / 10.0;
        page.set_style(
            ids::MERMAID_CONTAINER,
            "transform",
            &format!("scale({})", self.scale),
        );
        self.scale
    }

    /// Copy the mind-map source into the container as a `pre.mermaid` block
    /// and hand it to the renderer.
    pub async fn render(
        &self,
        page: &Page,
        renderer: &dyn DiagramRenderer,
    ) -> Result<(), DiagramError> {
        let source = page
            .value_of(ids::MINDMAP_CODE)
            .ok_or(DiagramError::MissingElement(ids::MINDMAP_CODE))?;
        let container = page
            .element(ids::MERMAID_CONTAINER)
            .ok_or(DiagramError::MissingElement(ids::MERMAID_CONTAINER))?;

        let wrapper = parse_fragment(r#"<pre class="mermaid"></pre>"#)?;
        if let Some(pre) = wrapper.first_child() {
            pre.append(NodeRef::new_text(source.as_str()));
        }
        crate::page::replace_children(container.as_node(), &wrapper);
        debug!(bytes = source.len(), "mind-map source placed");

        renderer.render(&source).await
    }

    /// Show the container after `delay` and render once.
    pub async fn mount(
        &self,
        page: &Page,
        renderer: &dyn DiagramRenderer,
        delay: Duration,
    ) -> Result<(), DiagramError> {
        tokio::time::sleep(delay).await;
        page.show(ids::MERMAID_CONTAINER);
        self.render(page, renderer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use url::Url;

    #[derive(Default)]
    struct CapturingRenderer(Mutex<Vec<String>>);

    #[async_trait]
    impl DiagramRenderer for CapturingRenderer {
        async fn render(&self, source: &str) -> Result<(), DiagramError> {
            self.0.lock().unwrap().push(source.to_string());
            Ok(())
        }
    }

    fn page() -> Page {
        Page::parse(
            r#"<html><body>
                <textarea id="mindmap-code">mindmap
  root((CDP))
    <b>Profiles</b></textarea>
                <div id="mermaid-container" style="display: none"><p>old</p></div>
            </body></html>"#,
            Url::parse("https://bot.example.com/mindmap").unwrap(),
        )
    }

    #[test]
    fn zoom_out_clamps_at_half() {
        let page = page();
        let mut panel = MindmapPanel::default();
        for _ in 0..4 {
            panel.zoom_out(&page);
        }
        assert_eq!(panel.scale(), 0.6);
        assert_eq!(panel.zoom_out(&page), 0.5);
        assert_eq!(panel.zoom_out(&page), 0.5);
        assert_eq!(
            page.style_of(ids::MERMAID_CONTAINER, "transform").as_deref(),
            Some("scale(0.5)")
        );
    }

    #[test]
    fn zoom_in_and_reset() {
        let page = page();
        let mut panel = MindmapPanel::default();
        panel.zoom_in(&page);
        assert_eq!(panel.zoom_in(&page), 1.2);
        assert_eq!(panel.reset(&page), 1.0);
        assert_eq!(
            page.style_of(ids::MERMAID_CONTAINER, "transform").as_deref(),
            Some("scale(1)")
        );
    }

    #[tokio::test]
    async fn render_places_source_as_text() {
        let page = page();
        let renderer = CapturingRenderer::default();
        MindmapPanel::default()
            .mount(&page, &renderer, Duration::ZERO)
            .await
            .unwrap();

        let rendered = renderer.0.lock().unwrap().clone();
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].starts_with("mindmap"));

        let html = page.to_html();
        assert!(html.contains(r#"<pre class="mermaid">"#));
        assert!(html.contains("&lt;b&gt;Profiles&lt;/b&gt;"));
        assert!(!html.contains("<p>old</p>"));
        assert!(!page.is_hidden(ids::MERMAID_CONTAINER));
    }

    #[tokio::test]
    async fn render_without_source_fails() {
        let page = Page::parse(
            "<html><body></body></html>",
            Url::parse("https://bot.example.com/").unwrap(),
        );
        let err = MindmapPanel::default()
            .render(&page, &LoggingDiagramRenderer)
            .await
            .unwrap_err();
        assert!(matches!(err, DiagramError::MissingElement("mindmap-code")));
    }
}
