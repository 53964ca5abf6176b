use crate::owndex::open_repo;
use crate::prelude::*;
use clap::ArgMatches;
use dv_dex::classes::ClassDefItem;
use nu_ansi_term::Color;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;

/// Verification settings given on the command line.
pub(crate) fn verify_options(args: &ArgMatches) -> VerifyOptions {
    VerifyOptions {
        aot_mode: args.get_flag("aot"),
        api_level: args.get_one::<u32>("api-level").copied().unwrap_or(0),
        log_hard_failures: true,
    }
}

fn filter(args: &ArgMatches, name: &str) -> DvResult<Option<Regex>> {
    Ok(args
        .get_one::<String>(name)
        .map(|re| Regex::new(re))
        .transpose()?)
}

fn verify_filtered(
    repo: &Repo,
    dex: &Dex,
    class_def: &ClassDefItem,
    method_filter: Option<&Regex>,
    options: &VerifyOptions,
) -> DvResult<ClassVerification> {
    let Some(method_filter) = method_filter else {
        return Ok(verify_class(repo, dex, class_def, options)?);
    };
    let mut result = ClassVerification {
        class: class_def.descriptor(dex)?.to_string(),
        data: FailureData::default(),
        failures: Vec::new(),
        methods: Vec::new(),
    };
    for method in class_def.methods() {
        if !method_filter.is_match(method.descriptor(dex)?.name(dex)?) {
            continue;
        }
        let verification = verify_method(repo, dex, class_def, method, options)?;
        result.data.merge(&verification.data);
        result.methods.push(verification);
    }
    Ok(result)
}

fn print_class(result: &ClassVerification) {
    for failure in &result.failures {
        println!("{} {}", Color::Red.paint("rejected"), failure.message);
    }
    for method in &result.methods {
        let kind = method.data.kind.to_string();
        let status = match method.data.kind {
            FailureKind::NoFailure => Color::Green.paint(kind),
            FailureKind::HardFailure => Color::Red.paint(kind),
            _ => Color::Yellow.paint(kind),
        };
        println!("{status} {}", method.method);
        for failure in &method.failures {
            println!("    {} {}", failure.kind, failure.message);
        }
    }
}

pub fn run(args: &ArgMatches) -> DvResult<()> {
    init_logger(args);

    let (repo, input) = open_repo(args)?;
    let options = verify_options(args);
    let class_filter = filter(args, "filter-class")?;
    let method_filter = filter(args, "filter-method")?;

    let mut targets = Vec::new();
    for dex in input.borrow_dexs() {
        for class_def in dex.iter_class_defs() {
            let descriptor = class_def.descriptor(dex)?;
            if let Some(re) = &class_filter {
                if !re.is_match(descriptor) {
                    continue;
                }
            }
            targets.push((dex, class_def));
        }
    }
    log::info!("verifying {} classes", targets.len());

    let verify = |(dex, class_def): &(&Dex, &ClassDefItem)| {
        verify_filtered(&repo, dex, class_def, method_filter.as_ref(), &options)
    };
    let results: Vec<ClassVerification> = if args.get_flag("parallel") {
        targets.par_iter().map(verify).collect::<DvResult<_>>()?
    } else {
        targets.iter().map(verify).collect::<DvResult<_>>()?
    };

    let mut summary: BTreeMap<FailureKind, usize> = BTreeMap::new();
    let mut nb_methods = 0;
    for result in &results {
        print_class(result);
        nb_methods += result.methods.len();
        for method in &result.methods {
            *summary.entry(method.data.kind).or_default() += 1;
        }
    }

    log::info!("");
    log::info!(
        "verified methods: {} / {}",
        summary.get(&FailureKind::NoFailure).copied().unwrap_or(0),
        nb_methods
    );
    for (kind, count) in summary.iter().filter(|(kind, _)| **kind != FailureKind::NoFailure) {
        log::info!("  {kind}: {count}");
    }
    let rejected_classes = results.iter().filter(|r| r.is_hard_failure()).count();
    if rejected_classes > 0 {
        log::warn!("{rejected_classes} classes with hard failures");
    }
    Ok(())
}
