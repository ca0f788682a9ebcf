use anyhow::Result;
use gemmtune_autotune::cache::AutotuneCache;
use gemmtune_autotune::report::{PassSummary, TextReport};
use gemmtune_backend_cpu::device::Platform;
use gemmtune_driver::options::{OptionError, TuneArgs};
use gemmtune_driver::session::TuningSession;
use gemmtune_kernels::config::ProblemShape;
use std::path::PathBuf;

fn args(n: usize) -> TuneArgs {
    TuneArgs {
        device: Some("cpu".to_string()),
        n: Some(n),
        ..TuneArgs::default()
    }
}

fn scratch(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("gemmtune-{}-{}", name, std::process::id()))
}

#[test]
fn full_search_prunes_to_top_four() -> Result<()> {
    let options = TuneArgs {
        trials: 3,
        top_n: Some(4),
        ..args(256)
    }
    .validate()?;
    let session = TuningSession::new(options)?;
    let mut report = TextReport::new(Vec::new());

    let outcome = session.run(&Platform::host(), &mut report)?;
    let text = String::from_utf8(report.into_inner())?;

    assert_eq!(outcome.passes.len(), 1);
    let pass = &outcome.passes[0];
    assert!(!pass.candidates.is_empty());
    assert_eq!(pass.trials, 3);
    for round in 0..3 {
        assert!(text.contains(&format!("--- trial {round} done")));
    }
    assert!(pass.good_kernel_count >= 4);
    // at most the four fastest survive, plus anything tied with the fourth
    let mut times: Vec<u64> = pass.survivors().map(|c| c.stat.time_us).collect();
    times.sort_unstable();
    assert!(times.len() <= 4 || times[3..].iter().all(|t| *t == times[3]));
    assert!(pass.survivors().all(|c| c.stat.flops > 0 && c.stat.rounds == 3));
    assert!(pass
        .candidates
        .iter()
        .any(|c| c.params.is_some_and(|p| p.group_size == 8)));
    assert!(outcome.best.is_some());
    assert!(text.contains(&format!("good kernels: {}", pass.good_kernel_count)));
    Ok(())
}

#[test]
fn nested_search_refines_the_first_pass_winner() -> Result<()> {
    let options = TuneArgs {
        nested: true,
        trials: 2,
        quick_scan: true,
        ..args(64)
    }
    .validate()?;
    let session = TuningSession::new(options)?;
    let mut report = TextReport::new(Vec::new());

    let outcome = session.run(&Platform::host(), &mut report)?;
    let text = String::from_utf8(report.into_inner())?;

    assert_eq!(outcome.passes.len(), 2);
    assert_eq!(outcome.passes[0].trials, 1);
    assert_eq!(outcome.passes[1].trials, 2);
    let (group_size, block_height) = outcome.nested_pair.expect("first pass winner");
    assert!(outcome.passes[1].candidates.iter().all(|c| c
        .params
        .is_some_and(|p| p.group_size == group_size && p.block_height == block_height)));
    assert!(text.contains("*** nested optimization first pass"));
    assert!(text.contains("*** nested optimization second pass"));
    Ok(())
}

#[test]
fn fixed_configuration_with_transposes_and_paranoid_check() -> Result<()> {
    let options = TuneArgs {
        m: Some(32),
        k: Some(48),
        group_size: Some(4),
        block_height: Some(8),
        extra_param: Some(1),
        transpose_a: true,
        transpose_b: true,
        paranoid_check: true,
        vector_hint: false,
        trials: 2,
        ..args(16)
    }
    .validate()?;
    let session = TuningSession::new(options)?;
    let mut report = TextReport::new(Vec::new());

    let outcome = session.run(&Platform::host(), &mut report)?;
    let pass = &outcome.passes[0];
    assert_eq!(pass.candidates.len(), 1);
    assert!(pass.candidates[0].stat.ok);
    assert_eq!(pass.good_kernel_count, 1);
    Ok(())
}

#[test]
fn results_are_persisted() -> Result<()> {
    let dir = scratch("persist");
    let cache_path = dir.join("cache.json");
    let json_path = dir.join("passes.json");
    let options = TuneArgs {
        group_size: Some(4),
        cache: Some(cache_path.clone()),
        json: Some(json_path.clone()),
        ..args(32)
    }
    .validate()?;
    let session = TuningSession::new(options)?;
    let mut report = TextReport::new(Vec::new());
    let outcome = session.run(&Platform::host(), &mut report)?;

    let cache = AutotuneCache::load_from_file(&cache_path)?;
    let cached = cache
        .get("cpu0", &ProblemShape::square(32))
        .expect("best configuration cached");
    let best = outcome.best.expect("winner");
    assert_eq!(cached.configuration, best.configuration);

    let passes: Vec<PassSummary> = serde_json::from_slice(&std::fs::read(&json_path)?)?;
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].candidates.len(), outcome.passes[0].candidates.len());

    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn invalid_dimensions_fail_before_any_device_work() {
    let errors = TuneArgs {
        device: Some("gpu".to_string()),
        ..args(30)
    }
    .validate()
    .unwrap_err();
    assert!(errors.contains(&OptionError::NotVectorMultiple { name: 'N', width: 4 }));
}

#[test]
fn missing_device_is_fatal() -> Result<()> {
    let options = TuneArgs {
        device: Some("gpu0".to_string()),
        ..args(32)
    }
    .validate()?;
    let session = TuningSession::new(options)?;
    let mut report = TextReport::new(Vec::new());
    assert!(session.run(&Platform::host(), &mut report).is_err());
    Ok(())
}

#[test]
fn unknown_kernel_family_is_rejected() -> Result<()> {
    let options = TuneArgs {
        kernel: "winograd".to_string(),
        ..args(32)
    }
    .validate()?;
    assert!(TuningSession::new(options).is_err());
    Ok(())
}
