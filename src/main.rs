//! Streams a sorted SAM/BAM alignment record stream into a CRAM container
//! file, alongside an optional crai-style companion index.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter};

use clap::{Arg, ArgAction, Command};
use cram_stream_encoder::driver::EncoderDriver;
use cram_stream_encoder::index::{CraiIndexSink, IndexSink, NullIndexSink};
use cram_stream_encoder::options::EncoderOptions;
use cram_stream_encoder::reference::FastaReferenceProvider;
use noodles::fasta;
use noodles::sam::alignment::RecordBuf;
use noodles_util::alignment::io::reader::Builder;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    const PROG_NAME: &str = "cram-stream-encoder";
    const VERSION: &str = "0.1.0";

    let matches = Command::new(PROG_NAME)
        .version(VERSION)
        .about("Streams a sorted SAM/BAM record stream into CRAM containers.")
        .arg(
            Arg::new("input")
                .help("input SAM/BAM file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .required(true)
                .help("output CRAM file"),
        )
        .arg(
            Arg::new("reference")
                .short('r')
                .long("reference")
                .required(true)
                .help("reference FASTA file (must have a .fai index)"),
        )
        .arg(
            Arg::new("index")
                .long("index")
                .required(false)
                .help("companion crai-style index output path"),
        )
        .arg(
            Arg::new("records-per-slice")
                .long("records-per-slice")
                .required(false)
                .value_parser(clap::value_parser!(usize))
                .help("records per slice (default 10000)"),
        )
        .arg(
            Arg::new("slices-per-container")
                .long("slices-per-container")
                .required(false)
                .value_parser(clap::value_parser!(usize))
                .help("slices per container (default 1)"),
        )
        .arg(
            Arg::new("quality-preservation-policy")
                .long("quality-preservation-policy")
                .required(false)
                .help("lossy quality preservation policy, e.g. \"*8\""),
        )
        .arg(
            Arg::new("paranoid")
                .long("paranoid")
                .action(ArgAction::SetTrue)
                .help("enable the paranoid round-trip check on every flush"),
        )
        .arg(
            Arg::new("discard-read-names")
                .long("discard-read-names")
                .action(ArgAction::SetTrue)
                .help("discard read names instead of preserving them"),
        )
        .arg(
            Arg::new("capture-tag")
                .long("capture-tag")
                .action(ArgAction::Append)
                .help("capture only this tag (repeatable); disables capture-all-tags"),
        )
        .arg(
            Arg::new("ignore-tag")
                .long("ignore-tag")
                .action(ArgAction::Append)
                .help("never capture this tag (repeatable)"),
        )
        .get_matches();

    let input_path = matches.get_one::<String>("input").expect("required");
    let output_path = matches.get_one::<String>("output").expect("required");
    let reference_path = matches.get_one::<String>("reference").expect("required");

    log::info!("encoding {input_path} -> {output_path}");

    let mut reader = Builder::default().build_from_path(input_path)?;
    let header = reader.read_header()?;

    let repository = fasta::indexed_reader::Builder::default()
        .build_from_path(reference_path)
        .map(fasta::repository::adapters::IndexedReader::new)
        .map(fasta::Repository::new)?;
    let reference_provider = FastaReferenceProvider::new(repository, &header);

    let mut options = EncoderOptions::default();

    if let Some(&n) = matches.get_one::<usize>("records-per-slice") {
        options.records_per_slice = n;
    }
    if let Some(&n) = matches.get_one::<usize>("slices-per-container") {
        options.slices_per_container = n;
    }
    if let Some(policy) = matches.get_one::<String>("quality-preservation-policy") {
        options.quality_preservation_policy = Some(policy.clone());
    }
    options.paranoid_mode = matches.get_flag("paranoid");
    options.preserve_read_names = !matches.get_flag("discard-read-names");

    let capture_tags: HashSet<String> = matches
        .get_many::<String>("capture-tag")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if !capture_tags.is_empty() {
        options.capture_all_tags = false;
        options.capture_tags = capture_tags;
    }
    options.ignore_tags = matches
        .get_many::<String>("ignore-tag")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let output_file = File::create(output_path)?;
    let sink: Box<dyn io::Write> = Box::new(BufWriter::new(output_file));

    let index_sink: Box<dyn IndexSink> = match matches.get_one::<String>("index") {
        Some(index_path) => {
            let index_file = File::create(index_path)?;
            Box::new(CraiIndexSink::new(BufWriter::new(index_file)))
        }
        None => Box::new(NullIndexSink),
    };

    let mut driver = EncoderDriver::new(sink, Box::new(reference_provider), index_sink, options);
    driver.write_header(&header.to_string())?;

    for result in reader.records(&header) {
        let record = result?;
        let record_buf = RecordBuf::try_from_alignment_record(&header, &record)?;
        driver.write_alignment(record_buf)?;
    }

    let stats = driver.finish()?;
    log::info!(
        "wrote {} records in {} containers ({} detached) to {output_path}",
        stats.records_written,
        stats.containers_sealed,
        stats.detached_records,
    );

    Ok(())
}
