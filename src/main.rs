use clap::Parser;
use rayon::ThreadPoolBuilder;
use schemaseed::pipeline::{self, CreateSchemaParams};
use schemaseed::predictor::PredictionMode;
use std::io;
use std::path::PathBuf;

/// Command-line tool for building wgMLST schema seeds.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Create a schema seed from genome assemblies or coding sequences
    Create {
        /// Directory of FASTA files, or a text file listing one FASTA path per line
        #[clap(short = 'i', long, value_parser)]
        input_files: PathBuf,

        /// Output directory; must not already exist
        #[clap(short = 'o', long, value_parser)]
        output_directory: PathBuf,

        /// Name of the schema directory created inside the output directory
        #[clap(long, value_parser, default_value = "schema_seed")]
        schema_name: String,

        /// Prodigal training file; copied into the schema and hashed into its config
        #[clap(long, value_parser)]
        ptf: Option<PathBuf>,

        /// Blast Score Ratio threshold for homology exclusion
        #[clap(long, value_parser, default_value_t = 0.6)]
        bsr: f64,

        /// Minimum nucleotide length for a coding sequence to stay in the pool
        #[clap(long, value_parser, default_value_t = 201)]
        minimum_length: usize,

        /// Genetic code table (1, 4, 11 or 25)
        #[clap(long, value_parser, default_value_t = 11)]
        translation_table: u8,

        /// Allele size variation threshold; persisted into the schema config
        /// for allele calling, not applied while building the seed
        #[clap(long, value_parser, default_value_t = 0.2)]
        size_threshold: f64,

        /// Minimizer k-mer size
        #[clap(long, value_parser, default_value_t = 5)]
        word_size: usize,

        /// Minimizer window size, in k-mers
        #[clap(long, value_parser, default_value_t = 5)]
        window_size: usize,

        /// Shared-minimizer proportion for joining an existing cluster
        #[clap(long, value_parser, default_value_t = 0.2)]
        clustering_sim: f64,

        /// Shared-minimizer proportion against the representative above
        /// which a member is dropped as a redundant allele
        #[clap(long, value_parser, default_value_t = 0.9)]
        representative_filter: f64,

        /// Shared-minimizer proportion between cluster members above which
        /// the shorter one is dropped
        #[clap(long, value_parser, default_value_t = 0.9)]
        intra_filter: f64,

        /// Number of parallel workers; capped at the machine's logical cores
        #[clap(long, value_parser, default_value_t = 1)]
        cpu: usize,

        /// Directory holding the blastp and makeblastdb executables;
        /// resolved through PATH when not given
        #[clap(long, value_parser)]
        blast_path: Option<PathBuf>,

        /// Path to the prodigal executable
        #[clap(long, value_parser, default_value = "prodigal")]
        prodigal_path: PathBuf,

        /// Prodigal running mode
        #[clap(long, value_parser, default_value = "single")]
        prodigal_mode: String,

        /// Input files already contain coding sequences; skip gene prediction
        #[clap(long, action)]
        cds: bool,

        /// Keep the temporary directory tree after the run
        #[clap(long, action)]
        no_cleanup: bool,

        /// Verbosity level (0 = error, 1 = info, 2 = debug)
        #[clap(short, long, default_value = "0")]
        verbose: u8,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Create {
            input_files,
            output_directory,
            schema_name,
            ptf,
            bsr,
            minimum_length,
            translation_table,
            size_threshold,
            word_size,
            window_size,
            clustering_sim,
            representative_filter,
            intra_filter,
            cpu,
            blast_path,
            prodigal_path,
            prodigal_mode,
            cds,
            no_cleanup,
            verbose,
        } => {
            env_logger::Builder::new()
                .filter_level(match verbose {
                    0 => log::LevelFilter::Error,
                    1 => log::LevelFilter::Info,
                    _ => log::LevelFilter::Debug,
                })
                .init();

            let workers = cpu.clamp(1, num_cpus::get());
            ThreadPoolBuilder::new()
                .num_threads(workers)
                .build_global()
                .unwrap();

            let prodigal_mode = match prodigal_mode.as_str() {
                "single" => PredictionMode::Single,
                "meta" => PredictionMode::Meta,
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("--prodigal-mode must be 'single' or 'meta', got '{}'", other),
                    ))
                }
            };

            let params = CreateSchemaParams {
                input: input_files,
                output_directory,
                schema_name,
                training_file: ptf,
                bsr,
                minimum_length,
                translation_table,
                size_threshold,
                word_size,
                window_size,
                clustering_sim,
                representative_filter,
                intra_filter,
                cds_input: cds,
                blast_path,
                prodigal_path,
                prodigal_mode,
                no_cleanup,
            };
            let summary = pipeline::create_schema_seed(&params)?;
            println!("Schema written to {}", summary.schema_dir.display());
        }
    }

    Ok(())
}
