//! Unlike command handler: fan `likes.delete` out over a worker pool.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::info;
use vk_client::api::ApiClient;
use vk_client::likes::{LikeKind, LikeTarget, Unliker, list_faves};
use vk_client::pool::{BarProgress, PoolConfig, ProgressSink, WorkItem, WorkerPool};

use super::Session;

/// Objects whose likes are removed.
pub enum UnlikeTargets {
    /// Explicit ids of one kind and owner.
    Ids {
        kind: LikeKind,
        owner_id: i64,
        ids: Vec<i64>,
    },
    /// Everything the current user has liked, walked kind by kind.
    Faves { kinds: Vec<LikeKind> },
}

pub struct UnlikeRequest {
    pub targets: UnlikeTargets,
    pub parallelism: usize,
    pub show_progress: bool,
}

pub async fn run_unlike_command(
    session: &Session,
    cancel: &CancellationToken,
    request: UnlikeRequest,
) -> Result<()> {
    let credential = session.credential(cancel).await?;
    let client = session.api_client(credential)?;
    let unliker = Unliker::new(&client);

    let progress = Arc::new(if request.show_progress {
        BarProgress::new()
    } else {
        BarProgress::hidden()
    });

    let handler_cancel = cancel.clone();
    let sink: Arc<dyn ProgressSink<LikeKind>> = progress.clone();
    let pool = WorkerPool::start(
        PoolConfig::with_parallelism(request.parallelism),
        sink,
        move |target: LikeTarget| {
            let unliker = unliker.clone();
            let cancel = handler_cancel.clone();
            async move { unliker.unlike(&cancel, &target).await.map(|_| ()) }
        },
    )?;

    let submitted = submit_targets(&client, cancel, &pool, &progress, request.targets).await;

    let stats = pool.finish().await?;
    progress.finish();
    submitted?;

    let mut kinds = progress.groups();
    kinds.sort();
    for kind in kinds {
        let failed = progress.failures(&kind);
        let removed = progress.position(&kind).saturating_sub(failed as u64);
        info!(%kind, removed, failed, "Likes removed");
    }
    info!(
        removed = stats.completed(),
        failed = stats.failed(),
        "Unlike complete"
    );
    if stats.failed() > 0 {
        bail!(
            "{} of {} likes could not be removed",
            stats.failed(),
            stats.total()
        );
    }
    Ok(())
}

async fn submit_targets(
    client: &ApiClient,
    cancel: &CancellationToken,
    pool: &WorkerPool<LikeTarget, LikeKind>,
    progress: &BarProgress<LikeKind>,
    targets: UnlikeTargets,
) -> Result<()> {
    match targets {
        UnlikeTargets::Ids {
            kind,
            owner_id,
            ids,
        } => {
            progress.register(kind, ids.len() as u64);
            let targets = ids
                .into_iter()
                .map(|id| LikeTarget::new(kind, owner_id, id))
                .collect();
            submit_all(cancel, pool, kind, targets).await
        }
        UnlikeTargets::Faves { kinds } => {
            for kind in kinds {
                let targets = list_faves(client, cancel, kind)
                    .await
                    .with_context(|| format!("Failed to list liked {kind}s"))?;
                info!(%kind, count = targets.len(), "Liked objects found");
                progress.register(kind, targets.len() as u64);
                submit_all(cancel, pool, kind, targets).await?;
            }
            Ok(())
        }
    }
}

async fn submit_all(
    cancel: &CancellationToken,
    pool: &WorkerPool<LikeTarget, LikeKind>,
    kind: LikeKind,
    targets: Vec<LikeTarget>,
) -> Result<()> {
    for target in targets {
        pool.submit(cancel, WorkItem::new(target, kind))
            .await
            .context("Stopped before every like was queued")?;
    }
    Ok(())
}
