//! The submission pipeline: intake to durable commit.
//!
//! Stages run strictly in order; everything before the commit is
//! side-effect free except media staging, which is compensated with a
//! discard on any later rejection. After the commit nothing rolls back:
//! bump, trim, flood bookkeeping and page builds log failures and keep
//! going.

use std::sync::Arc;

use chrono::Utc;

use sumi_core::build::{BuildEnv, BuildTarget};
use sumi_core::capacity::{check_hard_limits, cyclical_evictions, should_bump, HardLimits};
use sumi_core::error::CoreError;
use sumi_core::filters::{
    evaluate, flood_scope_key, max_flood_window_secs, EvalInput, FilterCondition,
    FilterOutcome, FloodField, PredicateRegistry,
};
use sumi_core::fingerprint::fingerprint_files;
use sumi_core::models::{
    FileUpload, FloodEntry, NewBan, NewPost, PostCandidate, PostFile, PostRef, ThreadMeta,
};
use sumi_core::ports::{
    BanStore, CaptchaVerifier, DnsBlacklist, FingerprintStore, FloodCache, MarkupRenderer,
    MediaProcessor, MediaStore, PostStore, RemoteFetcher, StagedMedia,
};
use sumi_core::types::DbId;

use crate::config::BoardConfig;
use crate::dispatch::BuildDispatcher;
use crate::remote::with_timeout;

/// A submission as it arrives from the transport layer.
pub struct SubmitRequest {
    pub candidate: PostCandidate,
    pub captcha_token: Option<String>,
    /// Upload-by-URL: fetched into the file list when no direct upload
    /// accompanies the post.
    pub file_url: Option<String>,
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    pub post_id: DbId,
    pub thread_id: DbId,
    /// Page the submitter should land on.
    pub redirect: BuildTarget,
}

/// All collaborators of the submission flow, injected as ports.
pub struct SubmissionPipeline {
    pub posts: Arc<dyn PostStore>,
    pub bans: Arc<dyn BanStore>,
    pub flood: Arc<dyn FloodCache>,
    pub fingerprints: Arc<dyn FingerprintStore>,
    pub processor: Arc<dyn MediaProcessor>,
    pub media: Arc<dyn MediaStore>,
    pub markup: Arc<dyn MarkupRenderer>,
    pub captcha: Option<Arc<dyn CaptchaVerifier>>,
    pub dnsbl: Option<Arc<dyn DnsBlacklist>>,
    pub fetcher: Option<Arc<dyn RemoteFetcher>>,
    pub predicates: PredicateRegistry,
    pub dispatcher: Arc<BuildDispatcher>,
}

struct ProcessedFile {
    name: String,
    staged: StagedMedia,
    width: u32,
    height: u32,
    size: u64,
}

impl SubmissionPipeline {
    /// Run one candidate through the full flow.
    pub async fn submit(
        &self,
        cfg: &BoardConfig,
        request: SubmitRequest,
    ) -> Result<SubmitResult, CoreError> {
        let SubmitRequest { mut candidate, captcha_token, file_url } = request;
        let now = Utc::now();

        // Ban gate before anything else touches the candidate.
        if let Some(ban) = self.bans.active_for_ip(&candidate.ip, now).await? {
            return Err(CoreError::Banned { reason: ban.reason, until: ban.expires });
        }

        self.fetch_remote_upload(cfg, &mut candidate, file_url.as_deref())
            .await?;
        validate_candidate(cfg, &candidate)?;
        self.remote_checks(cfg, &candidate, captcha_token.as_deref())
            .await?;

        let file_data: Vec<&[u8]> = candidate.files.iter().map(|f| f.data.as_slice()).collect();
        let fingerprint = fingerprint_files(&file_data);

        if !candidate.moderator {
            let input = EvalInput {
                candidate: &candidate,
                file_fingerprint: fingerprint.as_deref(),
                now,
            };
            let outcome = evaluate(
                &cfg.filters,
                &input,
                self.flood.as_ref(),
                &self.predicates,
            )
            .await?;
            self.apply_outcome(outcome, &candidate, now).await?;
        }

        // Reply-side thread state, captured before the insert.
        let meta = match candidate.thread {
            Some(thread) => Some(self.thread_gate(cfg, &candidate, thread).await?),
            None => None,
        };

        let processed = self.process_files(cfg, &candidate).await?;

        if let (Some(hash), Some(scope)) = (fingerprint.as_deref(), cfg.dedup) {
            if let Some(original) = self
                .fingerprints
                .lookup(hash, scope, &candidate.board, candidate.thread)
                .await?
            {
                self.discard_all(&processed).await;
                return Err(CoreError::Duplicate {
                    message: "That file has already been posted.".to_string(),
                    original,
                });
            }
        }

        let (body_html, _cited) = self
            .markup
            .render(&candidate.board, &candidate.body)
            .await?;

        let post_id = self
            .commit(&candidate, processed, body_html, cfg.hard_limits, now)
            .await?;
        let thread_id = candidate.thread.unwrap_or(post_id);

        tracing::info!(
            board = %candidate.board,
            post_id,
            thread_id,
            reply = candidate.thread.is_some(),
            "Post committed",
        );

        if let Some(hash) = fingerprint.as_deref() {
            let post_ref = PostRef {
                board: candidate.board.clone(),
                thread: candidate.thread,
                post: post_id,
            };
            if let Err(e) = self.fingerprints.record(hash, &post_ref).await {
                tracing::error!(error = %e, post_id, "Fingerprint record failed");
            }
        }
        self.append_flood_entries(cfg, &candidate, fingerprint.as_deref(), now)
            .await;

        if let Some(meta) = &meta {
            self.bump_and_trim(cfg, &candidate, meta, post_id).await;
        }

        let redirect = BuildTarget::Thread { board: candidate.board.clone(), thread: thread_id };
        self.schedule_builds(&candidate.board, &redirect).await;

        Ok(SubmitResult { post_id, thread_id, redirect })
    }

    // -- Pre-commit stages --------------------------------------------------

    async fn fetch_remote_upload(
        &self,
        cfg: &BoardConfig,
        candidate: &mut PostCandidate,
        file_url: Option<&str>,
    ) -> Result<(), CoreError> {
        let Some(url) = file_url else {
            return Ok(());
        };
        if candidate.has_files() {
            return Err(CoreError::Validation(
                "Provide either an upload or a URL, not both.".to_string(),
            ));
        }
        let fetcher = self.fetcher.as_ref().ok_or_else(|| {
            CoreError::Validation("URL uploads are not enabled.".to_string())
        })?;
        let data = with_timeout(cfg.remote_timeout, "url fetch", fetcher.fetch(url)).await?;
        let name = url
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("download")
            .to_string();
        candidate.files.push(FileUpload {
            name,
            mime: "application/octet-stream".to_string(),
            data,
        });
        Ok(())
    }

    async fn remote_checks(
        &self,
        cfg: &BoardConfig,
        candidate: &PostCandidate,
        captcha_token: Option<&str>,
    ) -> Result<(), CoreError> {
        if candidate.moderator {
            return Ok(());
        }
        if cfg.require_captcha {
            let verifier = self.captcha.as_ref().ok_or_else(|| {
                CoreError::Config("captcha required but no verifier configured".to_string())
            })?;
            let token = captcha_token.ok_or_else(|| {
                CoreError::Validation("CAPTCHA response required.".to_string())
            })?;
            let ok = with_timeout(
                cfg.remote_timeout,
                "captcha",
                verifier.verify(token, &candidate.ip),
            )
            .await?;
            if !ok {
                return Err(CoreError::Validation(
                    "CAPTCHA verification failed.".to_string(),
                ));
            }
        }
        if cfg.check_dnsbl {
            if let Some(dnsbl) = self.dnsbl.as_ref() {
                let listed = with_timeout(
                    cfg.remote_timeout,
                    "dnsbl",
                    dnsbl.is_listed(&candidate.ip),
                )
                .await?;
                if listed {
                    return Err(CoreError::Validation(
                        "Your IP address is listed in a DNS blacklist.".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    async fn apply_outcome(
        &self,
        outcome: FilterOutcome,
        candidate: &PostCandidate,
        now: sumi_core::types::Timestamp,
    ) -> Result<(), CoreError> {
        match outcome {
            FilterOutcome::Allow => Ok(()),
            FilterOutcome::Reject { message } => {
                tracing::info!(board = %candidate.board, ip = %candidate.ip, "Filter rejected post");
                Err(CoreError::RateLimited(message))
            }
            FilterOutcome::Ban { message, reason, duration_secs } => {
                let until = duration_secs.map(|s| now + chrono::Duration::seconds(s));
                let ban = NewBan { ip: candidate.ip.clone(), reason, expires: until };
                let ban_id = self.bans.create_ban(&ban).await?;
                tracing::warn!(
                    board = %candidate.board,
                    ip = %candidate.ip,
                    ban_id,
                    "Filter banned submitter",
                );
                Err(CoreError::Banned { reason: message, until })
            }
        }
    }

    async fn thread_gate(
        &self,
        cfg: &BoardConfig,
        candidate: &PostCandidate,
        thread: DbId,
    ) -> Result<ThreadMeta, CoreError> {
        let meta = self
            .posts
            .thread_meta(&candidate.board, thread)
            .await?
            .ok_or(CoreError::NotFound { entity: "thread", id: thread })?;
        if meta.flags.locked && !candidate.moderator {
            return Err(CoreError::Validation("Thread locked.".to_string()));
        }
        check_hard_limits(&meta, candidate.has_files(), cfg.hard_limits)?;
        Ok(meta)
    }

    async fn process_files(
        &self,
        cfg: &BoardConfig,
        candidate: &PostCandidate,
    ) -> Result<Vec<ProcessedFile>, CoreError> {
        let mut processed: Vec<ProcessedFile> = Vec::with_capacity(candidate.files.len());
        for file in &candidate.files {
            let result = self.process_one(cfg, file).await;
            match result {
                Ok(p) => processed.push(p),
                Err(e) => {
                    self.discard_all(&processed).await;
                    return Err(e);
                }
            }
        }
        Ok(processed)
    }

    async fn process_one(
        &self,
        cfg: &BoardConfig,
        file: &FileUpload,
    ) -> Result<ProcessedFile, CoreError> {
        let dims = with_timeout(
            cfg.remote_timeout,
            "media decode",
            self.processor.decode(&file.data),
        )
        .await?;
        let thumb = with_timeout(
            cfg.remote_timeout,
            "thumbnail",
            self.processor
                .thumbnail(&file.data, cfg.thumb_max_width, cfg.thumb_max_height),
        )
        .await?;
        let staged = self
            .media
            .stage(&file.name, &file.data, Some(&thumb))
            .await?;
        Ok(ProcessedFile {
            name: file.name.clone(),
            staged,
            width: dims.width,
            height: dims.height,
            size: file.data.len() as u64,
        })
    }

    async fn discard_all(&self, processed: &[ProcessedFile]) {
        for p in processed {
            if let Err(e) = self.media.discard(&p.staged).await {
                tracing::error!(error = %e, staged = %p.staged.id, "Staged media discard failed");
            }
        }
    }

    // -- Commit and after ---------------------------------------------------

    async fn commit(
        &self,
        candidate: &PostCandidate,
        processed: Vec<ProcessedFile>,
        body_html: String,
        limits: HardLimits,
        now: sumi_core::types::Timestamp,
    ) -> Result<DbId, CoreError> {
        let mut files = Vec::with_capacity(processed.len());
        for p in processed {
            let (path, thumb_path) = self.media.commit(&p.staged).await?;
            files.push(PostFile {
                name: p.name,
                path,
                thumb_path,
                width: p.width,
                height: p.height,
                size: p.size,
            });
        }

        let post = NewPost {
            board: candidate.board.clone(),
            thread: candidate.thread,
            ip: candidate.ip.clone(),
            name: candidate.name.clone(),
            email: candidate.email.clone(),
            subject: candidate.subject.clone(),
            body: body_html,
            files: files.clone(),
            time: now,
        };
        match self.posts.insert_post(&post, limits).await {
            Ok(id) => Ok(id),
            Err(e) => {
                // Committed files would otherwise leak.
                for file in &files {
                    self.remove_file(file).await;
                }
                Err(e)
            }
        }
    }

    async fn append_flood_entries(
        &self,
        cfg: &BoardConfig,
        candidate: &PostCandidate,
        fingerprint: Option<&str>,
        now: sumi_core::types::Timestamp,
    ) {
        for fields in flood_field_sets(&cfg.filters) {
            if !fields_populated(&fields, candidate, fingerprint) {
                continue;
            }
            let entry = FloodEntry {
                scope_key: flood_scope_key(&fields, candidate, fingerprint),
                board: candidate.board.clone(),
                time: now,
            };
            if let Err(e) = self.flood.append(&entry).await {
                tracing::error!(error = %e, "Flood entry append failed");
            }
        }

        // The retention window is this board's widest rule window, so the
        // purge must not touch boards configured with longer windows.
        let window = max_flood_window_secs(&cfg.filters);
        if window > 0 {
            let cutoff = now - chrono::Duration::seconds(window);
            match self.flood.purge_older_than(&candidate.board, cutoff).await {
                Ok(purged) if purged > 0 => {
                    tracing::debug!(purged, board = %candidate.board, "Expired flood entries purged");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Flood purge failed"),
            }
        }
    }

    async fn bump_and_trim(
        &self,
        cfg: &BoardConfig,
        candidate: &PostCandidate,
        meta: &ThreadMeta,
        post_id: DbId,
    ) {
        if should_bump(&candidate.email, meta, meta.reply_count, cfg.reply_limit) {
            if let Err(e) = self.posts.bump_thread(&candidate.board, meta.id).await {
                tracing::error!(error = %e, thread = meta.id, "Thread bump failed");
            }
        }

        if !meta.flags.cycle {
            return;
        }
        let replies = match self.posts.reply_ids(&candidate.board, meta.id).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, thread = meta.id, "Cyclical trim skipped");
                return;
            }
        };
        let evict = cyclical_evictions(&replies, cfg.cycle_keep);
        if evict.is_empty() {
            return;
        }
        debug_assert!(!evict.contains(&post_id));
        match self.posts.delete_posts(&candidate.board, &evict).await {
            Ok(files) => {
                tracing::info!(
                    thread = meta.id,
                    evicted = evict.len(),
                    "Cyclical thread trimmed",
                );
                for file in &files {
                    self.remove_file(file).await;
                }
                if let Err(e) = self.fingerprints.forget(&candidate.board, &evict).await {
                    tracing::error!(error = %e, "Fingerprint cleanup failed");
                }
            }
            Err(e) => tracing::error!(error = %e, thread = meta.id, "Cyclical trim failed"),
        }
    }

    async fn remove_file(&self, file: &PostFile) {
        if let Err(e) = self.media.remove(&file.path).await {
            tracing::error!(error = %e, path = %file.path, "Stored file removal failed");
        }
        if let Some(thumb) = &file.thumb_path {
            if let Err(e) = self.media.remove(thumb).await {
                tracing::error!(error = %e, path = %thumb, "Thumbnail removal failed");
            }
        }
    }

    async fn schedule_builds(&self, board: &str, redirect: &BuildTarget) {
        let env = BuildEnv { redirect: Some(redirect.clone()) };
        let mut targets = vec![redirect.clone()];
        match self.posts.page_count(board).await {
            Ok(pages) => {
                for page in 1..=pages {
                    targets.push(BuildTarget::IndexPage { board: board.to_string(), page });
                }
            }
            Err(e) => tracing::error!(error = %e, board, "Page count lookup failed"),
        }
        targets.push(BuildTarget::Catalog { board: board.to_string() });

        for target in &targets {
            if let Err(e) = self.dispatcher.request_build(&env, target).await {
                tracing::error!(
                    error = %e,
                    target = %target.artifact_key(),
                    "Page build request failed",
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_candidate(cfg: &BoardConfig, candidate: &PostCandidate) -> Result<(), CoreError> {
    if candidate.board.is_empty() {
        return Err(CoreError::Validation("Board is required.".to_string()));
    }
    if candidate.body.trim().is_empty() && !candidate.has_files() {
        return Err(CoreError::Validation(
            "Post must contain a message or a file.".to_string(),
        ));
    }
    if candidate.body.chars().count() > cfg.max_body_len {
        return Err(CoreError::Validation("Message too long.".to_string()));
    }
    if candidate.name.chars().count() > cfg.max_name_len {
        return Err(CoreError::Validation("Name too long.".to_string()));
    }
    if candidate.email.chars().count() > cfg.max_email_len {
        return Err(CoreError::Validation("Email too long.".to_string()));
    }
    if candidate.subject.chars().count() > cfg.max_subject_len {
        return Err(CoreError::Validation("Subject too long.".to_string()));
    }
    if candidate.files.len() > cfg.max_files {
        return Err(CoreError::Validation(format!(
            "At most {} files per post.",
            cfg.max_files
        )));
    }
    if candidate.files.iter().any(|f| f.data.is_empty()) {
        return Err(CoreError::Validation("Uploaded file is empty.".to_string()));
    }
    Ok(())
}

/// Distinct flood field sets referenced anywhere in the rule list.
///
/// One flood entry is appended per set so later counts line up with the
/// keys the evaluator derives.
fn flood_field_sets(rules: &[sumi_core::filters::FilterRule]) -> Vec<Vec<FloodField>> {
    fn collect(cond: &FilterCondition, out: &mut Vec<Vec<FloodField>>) {
        match cond {
            FilterCondition::FloodMatch { fields, .. } => {
                if !out.contains(fields) {
                    out.push(fields.clone());
                }
            }
            FilterCondition::Negated(inner) => collect(inner, out),
            _ => {}
        }
    }
    let mut sets = Vec::new();
    for rule in rules {
        for cond in &rule.conditions {
            collect(cond, &mut sets);
        }
    }
    sets
}

/// Mirror of the evaluator's emptiness rule: entries keyed on an empty
/// body or a missing fingerprint are never counted, so they are never
/// appended either.
fn fields_populated(
    fields: &[FloodField],
    candidate: &PostCandidate,
    fingerprint: Option<&str>,
) -> bool {
    fields.iter().all(|field| match field {
        FloodField::Body => !candidate.body.trim().is_empty(),
        FloodField::File => fingerprint.is_some(),
        FloodField::Ip => true,
    })
}
