//! Collection assembly.
//!
//! [`CollectionAssembler::read_files`] turns one SNANA campaign output
//! directory into a [`Collection`]:
//!
//! 1. parse the campaign document, instrument file and file map;
//! 2. check the tier axes and map every `(area, texpose, zSNRMATCH)` cell to
//!    its variant;
//! 3. resolve the scratch directory once for the collection;
//! 4. build every variant on the blocking pool, dropping the ones that fail;
//! 5. join the cosmology fit summary;
//! 6. persist and register the result.

use anyhow::Context;
use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::registry::CollectionRegistry;
use super::scratch::ScratchResolver;
use crate::core::domain::{Collection, SurveyVariant, Tier, TierCandidateIds};
use crate::db::repo_config::SummaryConfig;
use crate::db::repository::ArtifactRepository;
use crate::db::{services, RepositoryFactory};
use crate::error::{SummaryError, SummaryResult};
use crate::parsing::config_parser::{
    locate_fit_summary, read_campaign, short_survey_name, validate_filemap, validate_tier_axes,
    CampaignConfig,
};
use crate::parsing::filemap::VariantIndex;
use crate::parsing::readme::read_gentype_map;
use crate::parsing::simlib_doc::read_simlib_doc;
use crate::services::cosmology::FitSummary;
use crate::services::spectra;
use crate::services::zhist::ZHistogramBuilder;

static OUTPUT_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^output_?(.*)$").expect("output dir pattern compiles"));

/// Flags of one [`CollectionAssembler::read_files`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Ignore cached artifacts and rebuild from the SNANA outputs.
    pub regen: bool,
    /// Persist the rebuilt collection.
    pub savecache: bool,
    /// Replace a collection already in the registry.
    pub clobber: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            regen: false,
            savecache: true,
            clobber: false,
        }
    }
}

/// One cell of the design space, resolved through the file map.
#[derive(Debug, Clone)]
struct VariantJob {
    index: VariantIndex,
    name: String,
    version: String,
    simlib: PathBuf,
}

/// Inputs shared read-only by every variant task.
struct VariantContext {
    tiers: Vec<Tier>,
    prescales: BTreeMap<String, f64>,
    zhist: ZHistogramBuilder,
    scratch: PathBuf,
}

/// A successfully built variant.
#[derive(Debug, Clone)]
pub struct BuiltVariant {
    pub name: String,
    pub variant: SurveyVariant,
    pub candidate_ids: TierCandidateIds,
}

/// Result of one variant task.
#[derive(Debug)]
pub enum VariantOutcome {
    Built(Box<BuiltVariant>),
    Failed { name: String, error: anyhow::Error },
}

pub struct CollectionAssembler {
    repo: Arc<dyn ArtifactRepository>,
    registry: CollectionRegistry,
    scratch: ScratchResolver,
    zhist: ZHistogramBuilder,
    max_parallel: usize,
}

impl CollectionAssembler {
    pub fn new(config: &SummaryConfig, repo: Arc<dyn ArtifactRepository>) -> Self {
        Self {
            repo,
            registry: CollectionRegistry::new(),
            scratch: ScratchResolver::new(
                config.scratch.clone(),
                config.pipeline.snana_simdir.clone(),
            ),
            zhist: ZHistogramBuilder::new(config.pipeline.snrmax_cut),
            max_parallel: config.pipeline.max_parallel.max(1),
        }
    }

    /// Build an assembler with the store named in `config`.
    pub fn from_config(config: &SummaryConfig) -> SummaryResult<Self> {
        let repo = RepositoryFactory::create(config)?;
        Ok(Self::new(config, repo))
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn repository(&self) -> &Arc<dyn ArtifactRepository> {
        &self.repo
    }

    /// Read one collection from its SNANA output directory.
    ///
    /// # Arguments
    /// * `collection` - Name the collection is registered and stored under
    /// * `snana_outdir` - Directory holding `INP*`, the file map and `OUTPUT3*`
    /// * `options` - Cache and registry flags
    ///
    /// # Returns
    /// * `Ok(Arc<Collection>)` - The registered collection
    /// * `Err(SummaryError)` - Any collection-level failure; nothing is stored
    pub async fn read_files(
        &self,
        collection: &str,
        snana_outdir: &Path,
        options: ReadOptions,
    ) -> SummaryResult<Arc<Collection>> {
        self.registry.ensure_vacant(collection, options.clobber)?;

        if !options.regen {
            if let Some(cached) = services::load_collection(self.repo.as_ref(), collection).await? {
                info!("Loaded collection {} from cache", collection);
                return self.registry.insert(cached, options.clobber);
            }
        }

        let dir = std::fs::canonicalize(snana_outdir).map_err(|e| SummaryError::io(snana_outdir, e))?;
        info!("Reading collection {} from {}", collection, dir.display());
        let assembled = self.assemble(collection, &dir).await?;

        // The name is claimed before anything is written; a concurrent read
        // of the same name stops at the registry.
        let (registered, previous) = self.registry.swap_in(assembled, options.clobber)?;
        if options.savecache {
            if let Err(e) = services::store_collection(self.repo.as_ref(), &registered).await {
                self.registry.roll_back(&registered, previous)?;
                return Err(e);
            }
        }
        info!(
            "Collection {} ready with {} survey variants",
            collection,
            registered.surveys.len()
        );
        Ok(registered)
    }

    /// Read every `output*` directory under `searchdir`, naming each
    /// collection after the part following `output_`.
    ///
    /// # Returns
    /// The collection names read, in directory-name order.
    pub async fn process_searchdir(
        &self,
        searchdir: &Path,
        options: ReadOptions,
    ) -> SummaryResult<Vec<String>> {
        info!("Looking for collections in {}", searchdir.display());
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(searchdir).map_err(|e| SummaryError::io(searchdir, e))? {
            let entry = entry.map_err(|e| SummaryError::io(searchdir, e))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with("output") && entry.path().is_dir() {
                dirs.push((file_name, entry.path()));
            }
        }
        dirs.sort();

        let mut names = Vec::with_capacity(dirs.len());
        for (dir_name, path) in dirs {
            let name = collection_name(&dir_name)?;
            info!("Working on collection {}", name);
            self.read_files(&name, &path, options).await?;
            names.push(name);
        }
        info!("All done with collections in {}", searchdir.display());
        Ok(names)
    }

    async fn assemble(&self, collection: &str, dir: &Path) -> SummaryResult<Collection> {
        let config = read_campaign(dir)?;
        let jobs = plan_variants(collection, dir, &config)?;

        let scratch = match jobs.first() {
            Some(job) => self.scratch.resolve(collection, &job.version).await?,
            None => PathBuf::new(),
        };

        let context = Arc::new(VariantContext {
            tiers: config.tiers.clone(),
            prescales: config.analysisinfo.prescales.clone(),
            zhist: self.zhist,
            scratch,
        });
        let outcomes = self.run_variants(context, jobs).await?;

        let mut surveys = BTreeMap::new();
        let mut spectiercids = BTreeMap::new();
        for outcome in outcomes {
            match outcome {
                VariantOutcome::Built(built) => {
                    let BuiltVariant {
                        name,
                        variant,
                        candidate_ids,
                    } = *built;
                    spectiercids.insert(name.clone(), candidate_ids);
                    surveys.insert(name, variant);
                }
                VariantOutcome::Failed { name, error } => {
                    error!("Failed to get survey info for {}: {:#}", name, error);
                }
            }
        }

        let fit_path = locate_fit_summary(dir)?;
        debug!("Reading {}", fit_path.display());
        let fit = FitSummary::read(&fit_path)?;
        fit.join(config.analysisinfo.muopt.len(), &mut surveys)?;

        Ok(Collection {
            name: collection.to_string(),
            surveyinfo: config.surveyinfo,
            instrinfo: config.instrinfo,
            analysisinfo: config.analysisinfo,
            tiers: config.tiers,
            surveys,
            spectiercids,
        })
    }

    /// Run every job on the blocking pool, at most `max_parallel` at once.
    /// Outcomes come back in design-space order.
    async fn run_variants(
        &self,
        context: Arc<VariantContext>,
        jobs: Vec<VariantJob>,
    ) -> SummaryResult<Vec<VariantOutcome>> {
        let permits = Arc::new(Semaphore::new(self.max_parallel));
        let mut set = JoinSet::new();

        for (slot, job) in jobs.into_iter().enumerate() {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|e| SummaryError::Consistency(format!("variant pool closed: {}", e)))?;
            let context = Arc::clone(&context);
            set.spawn_blocking(move || {
                let _permit = permit;
                (slot, run_variant(&context, job))
            });
        }

        let mut outcomes = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => outcomes.push(pair),
                Err(e) => outcomes.push((
                    usize::MAX,
                    VariantOutcome::Failed {
                        name: "<unknown>".to_string(),
                        error: anyhow::anyhow!("variant task did not complete: {}", e),
                    },
                )),
            }
        }
        outcomes.sort_by_key(|(slot, _)| *slot);
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }
}

/// Collection name of an `output*` directory.
pub fn collection_name(dir_name: &str) -> SummaryResult<String> {
    OUTPUT_DIR_RE
        .captures(dir_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            SummaryError::Config(format!("Failed to parse {} for output_?(.*)", dir_name))
        })
}

/// Map every design-space cell to its file-map row.
fn plan_variants(
    collection: &str,
    dir: &Path,
    config: &CampaignConfig,
) -> SummaryResult<Vec<VariantJob>> {
    let axes = validate_tier_axes(&config.tiers)?;
    validate_filemap(&config.filemap, axes)?;

    let mut jobs = Vec::with_capacity(axes.len());
    let mut seen: BTreeMap<String, VariantIndex> = BTreeMap::new();
    for area in 0..axes.n_area {
        for texpose in 0..axes.n_texpose {
            for zsnrmatch in 0..axes.n_zsnrmatch {
                let index = VariantIndex {
                    area,
                    texpose,
                    zsnrmatch,
                };
                let entry = config.filemap.lookup(index)?;
                let name = short_survey_name(collection, &entry.version);
                if let Some(other) = seen.insert(name.clone(), index) {
                    return Err(SummaryError::Consistency(format!(
                        "survey {} is mapped from both {} and {}",
                        name, other, index
                    )));
                }
                jobs.push(VariantJob {
                    index,
                    name,
                    version: entry.version.clone(),
                    simlib: config.filemap.simlib_path(entry, dir),
                });
            }
        }
    }
    Ok(jobs)
}

fn run_variant(context: &VariantContext, job: VariantJob) -> VariantOutcome {
    let name = job.name.clone();
    match catch_unwind(AssertUnwindSafe(|| build_variant(context, job))) {
        Ok(Ok(built)) => VariantOutcome::Built(Box::new(built)),
        Ok(Err(error)) => VariantOutcome::Failed { name, error },
        Err(_) => VariantOutcome::Failed {
            error: anyhow::anyhow!("panicked while building {}", name),
            name,
        },
    }
}

/// Everything one variant contributes: SIMLIB tiers, z histograms and
/// (when present) spectral histograms.
fn build_variant(context: &VariantContext, job: VariantJob) -> anyhow::Result<BuiltVariant> {
    debug!(
        "Processing {} {} ({})",
        job.index,
        job.version,
        job.simlib.display()
    );

    let tiers = read_simlib_doc(&job.simlib, &context.tiers)
        .with_context(|| format!("reading SIMLIB documentation of {}", job.version))?;

    let datadir = context.scratch.join(&job.version);
    let data_file = |ext: &str| datadir.join(format!("{}.{}", job.version, ext));

    let gentypemap = read_gentype_map(&data_file("README"))
        .with_context(|| format!("reading generator types of {}", job.version))?;
    let zhists = context
        .zhist
        .build_from_file(&data_file("DUMP"), &gentypemap, &context.prescales)
        .with_context(|| format!("histogramming dump of {}", job.version))?;
    let spectral = spectra::build_from_file(&data_file("SPEC"), &context.tiers)
        .with_context(|| format!("histogramming spectra of {}", job.version))?;

    Ok(BuiltVariant {
        name: job.name,
        variant: SurveyVariant {
            tiers,
            gentypemap,
            zhists,
            long_survey_version: job.version,
            spechists: Some(spectral.bundle),
            muopt: Vec::new(),
        },
        candidate_ids: spectral.candidate_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name() {
        assert_eq!(collection_name("output_1TIER").unwrap(), "1TIER");
        assert_eq!(collection_name("outputDEEP_ONLY").unwrap(), "DEEP_ONLY");
        assert!(collection_name("output").is_err());
        assert!(collection_name("output_").is_err());
        assert!(collection_name("results").is_err());
    }

    #[test]
    fn test_read_options_default() {
        let options = ReadOptions::default();
        assert!(!options.regen);
        assert!(options.savecache);
        assert!(!options.clobber);
    }
}
