//! Index mapping synchronizer.
//!
//! Brings the concrete index behind an alias in line with a declared mapping.
//! The alias is the only name consumers query; concrete indices are versioned
//! by timestamp and replaced when a mapping change cannot be applied in place.
//!
//! | Resolution of alias | put-mapping | Steps                                              |
//! |---------------------|-------------|----------------------------------------------------|
//! | `NotFound`          | -           | create new, put alias                              |
//! | `Standalone`        | -           | create new, reindex, atomically drop legacy and add alias |
//! | `Aliased(old)`      | `Applied`   | nothing further                                    |
//! | `Aliased(old)`      | `Conflict`  | create new, reindex, swap alias atomically, delete old |
//!
//! A new index whose migration fails before the alias reaches it is deleted
//! again, so a retry never finds a stray concrete index.

use chrono::Utc;
use tracing::{info, instrument, warn};

use protosync_search::{AliasAction, IndexResolution, IndexService, MappingUpdate};
use protosync_shared::{ElasticsearchConfig, MappingConfig, Module, ProtoSyncError, Result};

/// Terminal state reached by one synchronization, naming the path taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No index existed; a fresh one was created behind the alias.
    Created { index: String },
    /// A legacy standalone index was moved behind the alias.
    MigratedLegacy { index: String },
    /// The live index accepted the mapping in place.
    Updated { index: String },
    /// The live index was replaced by a re-indexed copy.
    Reindexed { from: String, to: String },
}

impl SyncOutcome {
    /// The concrete index the alias resolves to afterwards.
    pub fn live_index(&self) -> &str {
        match self {
            Self::Created { index } | Self::MigratedLegacy { index } | Self::Updated { index } => {
                index
            }
            Self::Reindexed { to, .. } => to,
        }
    }
}

/// Produces timestamped concrete index names for one module.
pub struct IndexNamer<'a> {
    config: &'a ElasticsearchConfig,
    module: &'a Module,
}

impl<'a> IndexNamer<'a> {
    pub fn new(config: &'a ElasticsearchConfig, module: &'a Module) -> Self {
        Self { config, module }
    }

    /// A fresh concrete index name that differs from `avoid`.
    pub fn next(&self, avoid: Option<&str>) -> String {
        let mut ts = Utc::now().timestamp_millis();
        loop {
            let name = self.config.concrete_index_for(self.module, ts);
            if avoid != Some(name.as_str()) {
                return name;
            }
            ts += 1;
        }
    }
}

/// Reconcile the index behind `alias` with `mapping`.
///
/// Never leaves `alias` pointing at more than one index, and in the aliased
/// cases never leaves it pointing at none.
#[instrument(skip(service, mapping, namer), fields(doc_type = %mapping.doc_type))]
pub async fn sync_mapping<S: IndexService>(
    service: &S,
    alias: &str,
    mapping: &MappingConfig,
    namer: &IndexNamer<'_>,
) -> Result<SyncOutcome> {
    match service.resolve(alias).await? {
        IndexResolution::NotFound => {
            let index = namer.next(None);
            info!(%index, "creating new index");
            service
                .create_index(&index, &mapping.create_index_body())
                .await?;
            info!(%index, alias, "creating alias");
            let attached = service.put_alias(&index, alias).await;
            discard_on_error(service, &index, attached).await?;
            Ok(SyncOutcome::Created { index })
        }

        IndexResolution::Standalone(legacy) => {
            info!(%legacy, "index is not behind an alias yet");
            let index = namer.next(Some(&legacy));
            info!(%index, "creating new index");
            service
                .create_index(&index, &mapping.create_index_body())
                .await?;

            let migrated = async {
                info!(from = %legacy, to = %index, "copying documents");
                service.reindex(&legacy, &index).await?;
                info!(%legacy, %index, alias, "replacing legacy index with alias");
                service
                    .update_aliases(&[
                        AliasAction::Add {
                            index: index.clone(),
                            alias: alias.to_string(),
                        },
                        AliasAction::RemoveIndex {
                            index: legacy.clone(),
                        },
                    ])
                    .await
            }
            .await;
            discard_on_error(service, &index, migrated).await?;
            Ok(SyncOutcome::MigratedLegacy { index })
        }

        IndexResolution::Aliased(current) => {
            let update = service
                .put_mapping(&current, &mapping.doc_type, &mapping.mapping_body())
                .await?;

            match update {
                MappingUpdate::Applied => {
                    info!(index = %current, "mapping updated in place");
                    Ok(SyncOutcome::Updated { index: current })
                }
                MappingUpdate::Conflict => reindex_and_swap(service, alias, current, mapping, namer).await,
                MappingUpdate::TransientFailure(reason) => Err(ProtoSyncError::network(
                    format!("put mapping on {current}: {reason}"),
                    true,
                )),
            }
        }
    }
}

/// Replace the live index with a re-indexed copy carrying the full mapping.
async fn reindex_and_swap<S: IndexService>(
    service: &S,
    alias: &str,
    current: String,
    mapping: &MappingConfig,
    namer: &IndexNamer<'_>,
) -> Result<SyncOutcome> {
    info!(index = %current, "field type conflict, re-indexing");

    let index = namer.next(Some(&current));
    info!(%index, "creating new index");
    service
        .create_index(&index, &mapping.create_index_body())
        .await?;

    let swapped = async {
        info!(from = %current, to = %index, "copying documents");
        service.reindex(&current, &index).await?;

        info!(from = %current, to = %index, alias, "switching alias");
        service
            .update_aliases(&[
                AliasAction::Remove {
                    index: current.clone(),
                    alias: alias.to_string(),
                },
                AliasAction::Add {
                    index: index.clone(),
                    alias: alias.to_string(),
                },
            ])
            .await
    }
    .await;
    discard_on_error(service, &index, swapped).await?;

    info!(index = %current, "deleting old index");
    service.delete_index(&current).await?;

    Ok(SyncOutcome::Reindexed {
        from: current,
        to: index,
    })
}

/// On error, delete the not-yet-live `index` before handing the error back.
async fn discard_on_error<S: IndexService, T>(
    service: &S,
    index: &str,
    result: Result<T>,
) -> Result<T> {
    if let Err(e) = &result {
        warn!(%index, error = %e, "migration failed, deleting new index");
        if let Err(cleanup) = service.delete_index(index).await {
            warn!(%index, error = %cleanup, "could not delete new index");
        }
    }
    result
}
