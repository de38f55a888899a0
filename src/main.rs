use clap::Parser;

use franken_opus::cli::{Cli, Command, ExtractArgs, InfoArgs, LocalizeArgs, VerifyRangeArgs};
use franken_opus::error::{FoError, FoResult};
use franken_opus::runner;
use franken_opus::{bitstream, decoder, localize, pcm, range_check};

fn main() {
    franken_opus::logging::init();

    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> FoResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Analyze(args) => {
            let config = args.harness_config();
            let report =
                runner::run_vector(&decoder::backend, &args.bitstream, &args.reference, &config)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", runner::render_vector_report(&report));
            }
            if report.range.is_failure(config.strict_range) {
                return Err(FoError::Conformance(format!(
                    "{} final-range mismatches under --strict-range",
                    report.range.failed
                )));
            }
            Ok(())
        }
        Command::Suite(args) => {
            let config = args.harness_config();
            let report = runner::run_suite(&decoder::backend, &args.directory, &config)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", runner::render_suite_report(&report));
            }
            if !report.failures.is_empty() {
                return Err(FoError::Conformance(format!(
                    "{} vector(s) failed structurally",
                    report.failures.len()
                )));
            }
            if report.aggregate_range.is_failure(config.strict_range) {
                return Err(FoError::Conformance(format!(
                    "{} final-range mismatches under --strict-range",
                    report.aggregate_range.failed
                )));
            }
            Ok(())
        }
        Command::VerifyRange(args) => verify_range(&args),
        Command::Localize(args) => localize_packets(&args),
        Command::Extract(args) => extract_packet(&args),
        Command::Info(args) => info(&args),
    }
}

fn verify_range(args: &VerifyRangeArgs) -> FoResult<()> {
    let packets = bitstream::read_bitstream_file(&args.bitstream)?;
    let channels = runner::resolve_channels(&packets, args.channels);
    let mut decoder = decoder::backend(args.sample_rate, channels)?;
    let tally = range_check::verify_final_ranges(&mut decoder, &packets);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tally)?);
    } else {
        println!(
            "final range: {}/{} passed ({:.1}%), {} skipped",
            tally.passed,
            tally.checked(),
            tally.pass_rate() * 100.0,
            tally.skipped
        );
        for mismatch in &tally.mismatches {
            println!(
                "  packet {}: got {:#010x}, want {:#010x}",
                mismatch.packet, mismatch.actual, mismatch.expected
            );
        }
    }
    if tally.is_failure(args.strict) {
        return Err(FoError::Conformance(format!(
            "{} final-range mismatches under --strict",
            tally.failed
        )));
    }
    Ok(())
}

fn localize_packets(args: &LocalizeArgs) -> FoResult<()> {
    let packets = bitstream::read_bitstream_file(&args.bitstream)?;
    let reference = pcm::read_reference_file(&args.reference)?;
    let channels = runner::resolve_channels(&packets, args.channels);
    let config = args.localize_config();

    let diagnoses = localize::diagnose_packets(
        || decoder::backend(args.sample_rate, channels),
        &packets,
        &reference,
        &args.packets,
        &config,
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&diagnoses)?);
    } else {
        for diagnosis in &diagnoses {
            print!("{}", runner::render_diagnosis(diagnosis));
        }
    }
    Ok(())
}

fn extract_packet(args: &ExtractArgs) -> FoResult<()> {
    let packets = bitstream::read_bitstream_file(&args.bitstream)?;
    let packet = packets.get(args.packet).ok_or_else(|| {
        FoError::InvalidRequest(format!(
            "packet index {} out of range ({} packets)",
            args.packet,
            packets.len()
        ))
    })?;
    bitstream::export_packet(packet, &args.output)?;
    println!(
        "wrote packet {} ({} payload bytes) to {}",
        args.packet,
        packet.payload.len(),
        args.output.display()
    );
    Ok(())
}

fn info(args: &InfoArgs) -> FoResult<()> {
    let packets = bitstream::read_bitstream_file(&args.bitstream)?;
    let info = bitstream::bitstream_info(&packets);
    let distribution = bitstream::frame_distribution(&packets);

    if args.json {
        let payload = serde_json::json!({
            "info": info,
            "distribution": distribution,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "{} packets, {} payload bytes, {} samples per channel signalled",
            info.packet_count, info.total_payload_bytes, info.duration_samples
        );
        if let Some(toc) = info.first_toc {
            println!("first packet: {toc}");
        }
        for bucket in &distribution {
            println!(
                "  {} {} samples ({:.1} ms): {} packets",
                bucket.mode,
                bucket.frame_samples,
                bucket.frame_samples as f64 / 48.0,
                bucket.packets
            );
        }
    }
    Ok(())
}
