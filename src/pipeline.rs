//! The schema-seed creation pipeline.
//!
//! Stages run strictly one after another over the worker pool; each
//! stage consumes only the surviving-identifier set and sequence store
//! of the previous one, and a fatal error in any batch aborts the whole
//! run. The running narrative of per-stage counts goes to stdout; the
//! diagnostics report records every sequence excluded as invalid.

use crate::acquisition::{self, AcquisitionResult};
use crate::blast::{self, BlastTools};
use crate::bsr;
use crate::clustering::{self, Cluster};
use crate::dedup;
use crate::fasta;
use crate::minimizers::MAX_K;
use crate::predictor::{PredictionMode, PredictorConfig};
use crate::registry::{self, id_cmp, GenomeRegistry};
use crate::schema::{self, SchemaConfig};
use crate::translation::{self, GeneticCode, SUPPORTED_TABLES};
use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Pool subsets of this many sequences per aligner invocation in the
/// global pass.
const BLAST_SUBSET_SIZE: usize = 100;

/// The clustering stage shards work into roughly this many batches.
const CLUSTERING_BATCHES: usize = 40;

pub struct CreateSchemaParams {
    pub input: PathBuf,
    pub output_directory: PathBuf,
    pub schema_name: String,
    pub training_file: Option<PathBuf>,
    pub bsr: f64,
    pub minimum_length: usize,
    pub translation_table: u8,
    pub size_threshold: f64,
    pub word_size: usize,
    pub window_size: usize,
    pub clustering_sim: f64,
    pub representative_filter: f64,
    pub intra_filter: f64,
    pub cds_input: bool,
    pub blast_path: Option<PathBuf>,
    pub prodigal_path: PathBuf,
    pub prodigal_mode: PredictionMode,
    pub no_cleanup: bool,
}

pub struct SchemaSummary {
    pub schema_dir: PathBuf,
    pub loci: Vec<String>,
}

struct TempTree {
    root: PathBuf,
    prediction: PathBuf,
    cds_files: PathBuf,
    cds_dedup: PathBuf,
    translation: PathBuf,
    protein_dedup: PathBuf,
    cluster_blaster: PathBuf,
    final_blast: PathBuf,
    cds_subsets: PathBuf,
    blast_results: PathBuf,
}

impl TempTree {
    fn create(output_directory: &Path) -> io::Result<Self> {
        let root = output_directory.join("temp");
        let tree = TempTree {
            prediction: root.join("1_cds_prediction"),
            cds_files: root.join("2_cds_files"),
            cds_dedup: root.join("3_cds_preprocess").join("cds_deduplication"),
            translation: root.join("3_cds_preprocess").join("cds_translation"),
            protein_dedup: root
                .join("3_cds_preprocess")
                .join("translated_cds_deduplication"),
            cluster_blaster: root.join("4_clustering").join("cluster_BLASTer"),
            final_blast: root.join("5_final_blast"),
            cds_subsets: root.join("5_final_blast").join("cds_subsets"),
            blast_results: root.join("5_final_blast").join("BLAST_results"),
            root,
        };
        for dir in [
            &tree.prediction,
            &tree.cds_files,
            &tree.cds_dedup,
            &tree.translation,
            &tree.protein_dedup,
            &tree.root.join("4_clustering").join("representative_filter"),
            &tree.root.join("4_clustering").join("intracluster_filter"),
            &tree.cluster_blaster,
            &tree.final_blast,
            &tree.cds_subsets,
            &tree.blast_results,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(tree)
    }
}

pub fn validate_params(params: &CreateSchemaParams) -> io::Result<()> {
    if params.output_directory.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "Output directory already exists: {}",
                params.output_directory.display()
            ),
        ));
    }
    if !(params.bsr > 0.0 && params.bsr < 1.0) {
        return Err(invalid_param(format!(
            "--bsr must be in (0, 1), got {}",
            params.bsr
        )));
    }
    if !(0.0..=1.0).contains(&params.size_threshold) {
        return Err(invalid_param(format!(
            "--size-threshold must be in [0, 1], got {}",
            params.size_threshold
        )));
    }
    if !(3..=MAX_K).contains(&params.word_size) {
        return Err(invalid_param(format!(
            "--word-size must be in [3, {}], got {}",
            MAX_K, params.word_size
        )));
    }
    if params.window_size == 0 {
        return Err(invalid_param("--window-size must be at least 1".to_string()));
    }
    if !SUPPORTED_TABLES.contains(&params.translation_table) {
        return Err(invalid_param(format!(
            "--translation-table must be one of {:?}, got {}",
            SUPPORTED_TABLES, params.translation_table
        )));
    }
    for threshold in [
        ("--clustering-sim", params.clustering_sim),
        ("--representative-filter", params.representative_filter),
        ("--intra-filter", params.intra_filter),
    ] {
        if !(0.0..=1.0).contains(&threshold.1) {
            return Err(invalid_param(format!(
                "{} must be in [0, 1], got {}",
                threshold.0, threshold.1
            )));
        }
    }
    Ok(())
}

fn invalid_param(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

pub fn create_schema_seed(params: &CreateSchemaParams) -> io::Result<SchemaSummary> {
    validate_params(params)?;
    let code = GeneticCode::new(params.translation_table).unwrap();

    let input_files = registry::collect_input_files(&params.input)?;
    println!("Found {} input files.", input_files.len());
    let genome_registry = GenomeRegistry::from_paths(&input_files)?;

    let schema_dir = params.output_directory.join(&params.schema_name);
    std::fs::create_dir_all(&schema_dir)?;
    let temp = TempTree::create(&params.output_directory)?;

    // Stage 2: CDS acquisition.
    let acquisition = if params.cds_input {
        println!("Renaming coding-sequence headers...");
        acquisition::acquire_cds_input(&genome_registry, &temp.prediction, &temp.cds_files)?
    } else {
        println!("Predicting coding sequences...");
        let config = PredictorConfig {
            executable: params.prodigal_path.clone(),
            translation_table: params.translation_table,
            mode: params.prodigal_mode,
            training_file: match params.prodigal_mode {
                PredictionMode::Single => params.training_file.clone(),
                PredictionMode::Meta => {
                    if params.training_file.is_some() {
                        println!("Training file is ignored in meta mode.");
                    }
                    None
                }
            },
        };
        acquisition::acquire_predicted(&genome_registry, &config, &temp.prediction, &temp.cds_files)?
    };
    if !acquisition.failed_genomes.is_empty() {
        println!(
            "Gene prediction failed for {} genomes (see gene_prediction_failures.tsv).",
            acquisition.failed_genomes.len()
        );
    }
    println!("Gathered {} coding sequences.", acquisition.total_cds);

    // Stage 3: nucleotide-level deduplication.
    let distinct_dna_file = temp.cds_dedup.join("distinct_cds.fasta");
    let dna_dedup = dedup::exclude_duplicates(
        &acquisition.chunk_files,
        &distinct_dna_file,
        &genome_registry,
        |seq| seq.to_ascii_uppercase(),
    )?;
    println!(
        "Removing duplicated DNA sequences...removed {} sequences.",
        dna_dedup.removed
    );

    // Stage 4: length filter.
    let (small_ids, small_lines) =
        translation::exclude_small(&distinct_dna_file, params.minimum_length)?;
    println!(
        "Removing sequences shorter than {} nucleotides...removed {} sequences.",
        params.minimum_length,
        small_ids.len()
    );
    let small_set: FxHashSet<&str> = small_ids.iter().map(String::as_str).collect();

    // Stage 5: translation over the case-insensitively sorted survivors.
    let mut survivors: Vec<String> = dna_dedup
        .distinct_ids
        .iter()
        .filter(|id| !small_set.contains(id.as_str()))
        .cloned()
        .collect();
    survivors.sort_by(|a, b| id_cmp(a, b));
    println!("Translating {} sequences...", survivors.len());
    let protein_file = temp.translation.join("translatable_cds.fasta");
    let translated = translation::translate_records(
        &survivors,
        &distinct_dna_file,
        code,
        params.minimum_length,
        &protein_file,
    )?;
    println!(
        "Removed {} untranslatable sequences.",
        translated.untranslatable.len()
    );
    write_diagnostics_report(
        &params.output_directory,
        &translated.report_lines,
        &small_lines,
    )?;

    // Stage 6: protein-level deduplication; synonymous CDS collapse here.
    let distinct_prot_file = temp.protein_dedup.join("distinct_prots.fasta");
    let prot_dedup = dedup::exclude_duplicates(
        &[protein_file],
        &distinct_prot_file,
        &genome_registry,
        |seq| seq.to_string(),
    )?;
    println!(
        "Removing duplicated protein sequences...removed {} sequences.",
        prot_dedup.removed
    );

    let proteins: FxHashMap<String, String> = prot_dedup
        .distinct_ids
        .iter()
        .map(|id| (id.clone(), translated.proteins[id].clone()))
        .collect();

    // Stage 7: minimizer clustering.
    let group_size = proteins.len().div_ceil(CLUSTERING_BATCHES).max(1);
    let clusters = clustering::cluster(
        &proteins,
        params.word_size,
        params.window_size,
        params.clustering_sim,
        group_size,
    );
    println!(
        "Clustered {} proteins into {} clusters.",
        proteins.len(),
        clusters.len()
    );

    // Stages 8 and 9: alignment-free pruning.
    let pruning = clustering::prune_by_representative(clusters, params.representative_filter);
    println!(
        "Representative filter excluded {} sequences ({} singletons).",
        pruning.excluded.len(),
        pruning.singletons.len()
    );
    let (clusters, intra_excluded) = clustering::prune_intra_cluster(
        pruning.clusters,
        &proteins,
        params.word_size,
        params.intra_filter,
    );
    println!(
        "Intra-cluster filter excluded {} sequences.",
        intra_excluded.len()
    );

    // Stage 10: cluster-local BSR pass.
    let tools = BlastTools::resolve(params.blast_path.as_deref());
    let multi: Vec<&Cluster> = clusters.iter().filter(|c| c.len() >= 2).collect();
    let mut candidates: FxHashSet<String> = pruning.singletons.iter().cloned().collect();
    for cluster in &clusters {
        for member in &cluster.members {
            candidates.insert(member.id.clone());
        }
    }
    if !multi.is_empty() {
        let excluded = cluster_local_bsr(&multi, &proteins, &tools, &temp, params.bsr)?;
        println!("Cluster-local BSR pass excluded {} sequences.", excluded.len());
        for id in excluded {
            candidates.remove(&id);
        }
    }

    // Stage 11: global BSR pass over the pooled survivors.
    let mut pool: Vec<String> = candidates.iter().cloned().collect();
    pool.sort_by(|a, b| id_cmp(a, b));
    if pool.len() >= 2 {
        let excluded = global_bsr(&pool, &proteins, &tools, &temp, params.bsr)?;
        println!("Global BSR pass excluded {} sequences.", excluded.len());
        for id in excluded {
            candidates.remove(&id);
        }
    }

    // Stage 12: schema assembly.
    let mut final_ids: Vec<String> = candidates.into_iter().collect();
    final_ids.sort_by(|a, b| id_cmp(a, b));
    let wanted: FxHashSet<String> = final_ids.iter().cloned().collect();
    let nucleotides: FxHashMap<String, String> = fasta::select_records(&distinct_dna_file, &wanted)?
        .into_iter()
        .collect();
    let entries: Vec<(String, String)> = final_ids
        .iter()
        .map(|id| {
            let sequence = nucleotides.get(id).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Surviving candidate has no stored sequence: {}", id),
                )
            })?;
            Ok((schema::sanitize_locus_name(id), sequence.clone()))
        })
        .collect::<io::Result<Vec<_>>>()?;
    schema::write_schema(&schema_dir, &entries)?;

    let loci: Vec<String> = entries.iter().map(|(locus, _)| locus.clone()).collect();
    schema::write_genes_list(&schema_dir, &loci)?;
    let training_file_hash = match &params.training_file {
        Some(training) => Some(schema::import_training_file(training, &schema_dir)?),
        None => None,
    };
    schema::write_config(
        &schema_dir,
        &SchemaConfig {
            bsr: params.bsr,
            translation_table: params.translation_table,
            minimum_locus_length: params.minimum_length,
            size_threshold: params.size_threshold,
            word_size: params.word_size,
            window_size: params.window_size,
            cluster_sim: params.clustering_sim,
            representative_filter: params.representative_filter,
            intra_filter: params.intra_filter,
            training_file_hash,
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )?;
    if let Some(coordinates) = &acquisition.coordinates_file {
        std::fs::copy(
            coordinates,
            params.output_directory.join("cds_coordinates.tsv"),
        )?;
    }
    relocate_failures_report(&acquisition, &temp, &params.output_directory)?;

    if params.no_cleanup {
        info!("Keeping temporary files in {}", temp.root.display());
    } else {
        std::fs::remove_dir_all(&temp.root)?;
    }

    println!("Created schema seed with {} loci.", loci.len());
    Ok(SchemaSummary { schema_dir, loci })
}

/// Translation-stage exclusions first, then the length filter's, one
/// `id<TAB>reason` line each. This report is the only persisted record
/// of invalid-sequence exclusions.
fn write_diagnostics_report(
    output_directory: &Path,
    translation_lines: &[String],
    small_lines: &[String],
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(output_directory.join("invalid_cds.txt"))?);
    for line in translation_lines.iter().chain(small_lines) {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()
}

fn relocate_failures_report(
    acquisition: &AcquisitionResult,
    temp: &TempTree,
    output_directory: &Path,
) -> io::Result<()> {
    if acquisition.failed_genomes.is_empty() {
        return Ok(());
    }
    let report = temp.prediction.join("gene_prediction_failures.tsv");
    std::fs::copy(&report, output_directory.join("gene_prediction_failures.tsv"))?;
    Ok(())
}

/// Align every member of each multi-member cluster against the cluster's
/// representative and drop members whose BSR meets the threshold.
/// Clusters are independent, so they run in parallel; the merged
/// exclusion set does not depend on scheduling.
fn cluster_local_bsr(
    clusters: &[&Cluster],
    proteins: &FxHashMap<String, String>,
    tools: &BlastTools,
    temp: &TempTree,
    threshold: f64,
) -> io::Result<Vec<String>> {
    let per_cluster: Vec<Vec<String>> = clusters
        .par_iter()
        .enumerate()
        .map(|(i, cluster)| {
            let dir = temp.cluster_blaster.join(format!("cluster_{}", i));
            std::fs::create_dir_all(&dir)?;

            let records: Vec<(String, String)> = cluster
                .members
                .iter()
                .map(|m| (m.id.clone(), proteins[&m.id].clone()))
                .collect();
            let query_file = dir.join("members.fasta");
            let id_map = blast::write_integer_headers(&records, &query_file)?;
            // The representative is records[0], so its synthetic header is
            // seq_0 in both the query file and the single-entry database.
            let rep_file = dir.join("representative.fasta");
            blast::write_integer_headers(&records[..1], &rep_file)?;

            let db = dir.join("representative_db");
            tools.make_db(&rep_file, &db)?;
            let out = dir.join("results.tsv");
            tools.align(&db, &query_file, &out)?;

            let hits = blast::parse_alignments(&out, &id_map)?;
            bsr::exclude_by_representative(&hits, cluster.representative(), threshold)
        })
        .collect::<io::Result<Vec<_>>>()?;

    let mut excluded = Vec::new();
    for cluster_excluded in per_cluster {
        excluded.extend(cluster_excluded);
    }
    debug!("cluster-local BSR excluded: {:?}", excluded);
    Ok(excluded)
}

/// All-vs-all alignment of the pooled survivors: clustering is
/// approximate, so true homologs that shared few minimizers can still
/// meet here. The pool is split into fixed-size query subsets aligned
/// against one database of the whole pool.
fn global_bsr(
    pool: &[String],
    proteins: &FxHashMap<String, String>,
    tools: &BlastTools,
    temp: &TempTree,
    threshold: f64,
) -> io::Result<Vec<String>> {
    let records: Vec<(String, String)> = pool
        .iter()
        .map(|id| (id.clone(), proteins[id].clone()))
        .collect();
    let pool_file = temp.final_blast.join("candidate_pool.fasta");
    let id_map = blast::write_integer_headers(&records, &pool_file)?;
    let db = temp.final_blast.join("candidate_pool_db");
    tools.make_db(&pool_file, &db)?;

    // Subset files reuse the pool's synthetic headers so one id table
    // covers every alignment output.
    let mut subsets = Vec::new();
    for (i, group) in records.chunks(BLAST_SUBSET_SIZE).enumerate() {
        let subset = temp.cds_subsets.join(format!("subset_{}.fasta", i));
        let offset = i * BLAST_SUBSET_SIZE;
        let mut writer = BufWriter::new(File::create(&subset)?);
        for (n, (_, seq)) in group.iter().enumerate() {
            writeln!(writer, ">seq_{}", offset + n)?;
            writeln!(writer, "{}", seq)?;
        }
        writer.flush()?;
        subsets.push(subset);
    }

    let outputs: Vec<PathBuf> = subsets
        .par_iter()
        .enumerate()
        .map(|(i, subset)| {
            let out = temp.blast_results.join(format!("subset_{}.tsv", i));
            tools.align(&db, subset, &out)?;
            Ok(out)
        })
        .collect::<io::Result<Vec<_>>>()?;

    let mut hits = Vec::new();
    for out in &outputs {
        hits.extend(blast::parse_alignments(out, &id_map)?);
    }
    let self_scores = bsr::self_scores(&hits);
    bsr::exclude_global(&hits, &self_scores, threshold)
}
