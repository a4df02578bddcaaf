//! Build dispatch: resolve a strategy decision for each affected page and
//! carry it out.

use std::sync::Arc;

use sumi_core::build::{
    resolve_action, BuildAction, BuildEnv, BuildStrategy, BuildTarget, DeferStrategy,
    ImmediateStrategy, LoadShedStrategy, OnAccessStrategy, SaneStrategy,
};
use sumi_core::error::CoreError;
use sumi_core::ports::{BuildQueue, PageRenderer, PageStore};

/// Build a strategy chain from configuration names.
///
/// Accepted: `sane`, `immediate`, `defer`, `on_access`, `load_shed:N`
/// (defer index pages past page N). The chain must end in a catch-all;
/// [`resolve_action`] reports a config error at request time otherwise.
pub fn strategy_chain(names: &[String]) -> Result<Vec<Box<dyn BuildStrategy>>, CoreError> {
    let mut chain: Vec<Box<dyn BuildStrategy>> = Vec::with_capacity(names.len());
    for name in names {
        let strategy: Box<dyn BuildStrategy> = match name.as_str() {
            "sane" => Box::new(SaneStrategy),
            "immediate" => Box::new(ImmediateStrategy),
            "defer" => Box::new(DeferStrategy),
            "on_access" => Box::new(OnAccessStrategy),
            other => match other.strip_prefix("load_shed:") {
                Some(page) => {
                    let defer_beyond_page = page.parse().map_err(|_| {
                        CoreError::Config(format!("bad load_shed page in {other:?}"))
                    })?;
                    Box::new(LoadShedStrategy { defer_beyond_page })
                }
                None => {
                    return Err(CoreError::Config(format!(
                        "unknown build strategy {other:?}"
                    )))
                }
            },
        };
        chain.push(strategy);
    }
    if chain.is_empty() {
        return Err(CoreError::Config("empty build strategy chain".to_string()));
    }
    Ok(chain)
}

/// Routes page-generation requests through the configured strategy chain.
///
/// `Immediate` renders inline, `Defer` enqueues for the background
/// worker, `OnAccess` marks the artifact stale so [`serve`](Self::serve)
/// rebuilds it on the next read.
pub struct BuildDispatcher {
    strategies: Vec<Box<dyn BuildStrategy>>,
    queue: Arc<dyn BuildQueue>,
    pages: Arc<dyn PageStore>,
    renderer: Arc<dyn PageRenderer>,
}

impl BuildDispatcher {
    pub fn new(
        strategies: Vec<Box<dyn BuildStrategy>>,
        queue: Arc<dyn BuildQueue>,
        pages: Arc<dyn PageStore>,
        renderer: Arc<dyn PageRenderer>,
    ) -> Self {
        Self { strategies, queue, pages, renderer }
    }

    /// Handle one page-generation request.
    pub async fn request_build(
        &self,
        env: &BuildEnv,
        target: &BuildTarget,
    ) -> Result<(), CoreError> {
        let action = resolve_action(&self.strategies, env, target)?;
        tracing::debug!(
            target = %target.artifact_key(),
            action = ?action,
            "Build request resolved",
        );
        match action {
            BuildAction::Immediate => {
                let bytes = self.renderer.render(target).await?;
                self.pages.write(target, &bytes).await
            }
            BuildAction::Defer => self.queue.enqueue(target).await.map(|_| ()),
            BuildAction::OnAccess => self.pages.mark_stale(target).await,
        }
    }

    /// Read a page, rebuilding first when it is stale or missing.
    ///
    /// Two concurrent readers of the same stale page may both rebuild it;
    /// rendering is idempotent, so the duplicate work is accepted.
    pub async fn serve(&self, target: &BuildTarget) -> Result<Vec<u8>, CoreError> {
        let current = self.pages.read(target).await?;
        let stale = self.pages.is_stale(target).await?;
        if let Some(bytes) = current {
            if !stale {
                return Ok(bytes);
            }
        }
        let bytes = self.renderer.render(target).await?;
        self.pages.write(target, &bytes).await?;
        Ok(bytes)
    }
}
