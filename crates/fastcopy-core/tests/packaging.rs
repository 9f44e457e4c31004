use std::fs::{self, File};
use std::path::Path;

use eyre::Result;
use fastcopy_core::copy::{CopyOutcome, CopyTask};
use fastcopy_core::dir_stat::DirectoryStat;
use fastcopy_core::fs_capability::filetime_to_ms;
use fastcopy_core::metadata_codec::{decode_digest, decode_times};
use fastcopy_core::package::package_directory;
use fastcopy_core::{EngineContext, OverwritePolicy, PackagingPolicy, RunConfig};
use filetime::FileTime;

fn config(src: &Path, dst: &Path) -> RunConfig {
    RunConfig::new(vec![src.to_path_buf()], dst)
}

fn fill(dir: &Path, names: &[&str], len: usize) -> Result<()> {
    fs::create_dir_all(dir)?;
    for (n, name) in names.iter().enumerate() {
        let body: Vec<u8> = (0..len).map(|i| ((i + n * 7) % 256) as u8).collect();
        fs::write(dir.join(name), body)?;
    }
    Ok(())
}

fn has_reserved(dir: &Path) -> Result<bool> {
    for entry in fs::read_dir(dir)? {
        if entry?
            .file_name()
            .to_string_lossy()
            .starts_with(fastcopy_core::RESERVED_ARCHIVE_PREFIX)
        {
            return Ok(true);
        }
    }
    Ok(false)
}

#[test]
fn five_small_files_travel_as_one_archive() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let src = temp.path().join("docs");
    let dst = temp.path().join("out");
    let names = ["1.txt", "2.txt", "3.txt", "4.txt", "5.txt"];
    fill(&src, &names, 100)?;

    let cfg = config(&src, &dst);
    let descriptor = package_directory(&cfg, &src, &dst, false, 20_000)?;
    assert_eq!(descriptor.file_count, 5);
    assert_eq!(descriptor.archive_name, "_fastcopy_auto_create_docs.zip");
    assert_eq!(descriptor.source_dir_name, "docs");
    assert!(descriptor.archive_path.is_file());
    assert!(descriptor.archive_size > 0);

    let ctx = EngineContext::with_config(cfg);
    let outcome = CopyTask::archive(descriptor).run(&ctx);
    assert!(matches!(outcome, CopyOutcome::Copied { .. }));

    for name in names {
        assert_eq!(fs::read(src.join(name))?, fs::read(dst.join(name))?);
    }
    assert!(!has_reserved(&src)?);
    assert!(!has_reserved(&dst)?);
    assert_eq!(ctx.stats.files_copied(), 5);
    assert_eq!(ctx.stats.total_bytes(), 500);
    Ok(())
}

#[test]
fn archive_entries_carry_time_and_digest_blocks() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let src = temp.path().join("src");
    fill(&src, &["a", "b", "c"], 64)?;
    let stamp = FileTime::from_unix_time(1_650_000_000, 250_000_000);
    filetime::set_file_mtime(src.join("a"), stamp)?;

    let mut cfg = config(&src, &temp.path().join("dst"));
    cfg.verify_after_copy = true;
    let descriptor = package_directory(&cfg, &src, &temp.path().join("dst"), false, 20_000)?;

    let mut archive = zip::ZipArchive::new(File::open(&descriptor.archive_path)?)?;
    assert_eq!(archive.len(), 3);
    let entry = archive.by_name("a")?;
    let extra = entry.extra_data().unwrap_or_default();
    let times = decode_times(extra).expect("time block");
    assert_eq!(times.modified_ms, filetime_to_ms(stamp));
    let digest = decode_digest(extra).expect("digest block");
    assert_eq!(digest.len(), 32);
    Ok(())
}

#[test]
fn only_files_within_threshold_are_packaged() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let src = temp.path().join("src");
    fill(&src, &["s1", "s2", "s3"], 100)?;
    fill(&src, &["large"], 5_000)?;

    let cfg = config(&src, &temp.path().join("dst"));
    let descriptor = package_directory(&cfg, &src, &temp.path().join("dst"), false, 1_000)?;
    assert_eq!(descriptor.file_count, 3);
    fs::remove_file(&descriptor.archive_path)?;
    Ok(())
}

#[test]
fn recursive_packaging_keeps_relative_paths() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fill(&src, &["top"], 10)?;
    fill(&src.join("nested").join("deep"), &["leaf"], 10)?;

    let cfg = config(&src, &dst);
    let descriptor = package_directory(&cfg, &src, &dst, true, 20_000)?;
    assert_eq!(descriptor.file_count, 2);

    let ctx = EngineContext::with_config(cfg);
    CopyTask::archive(descriptor).run(&ctx);
    assert!(dst.join("top").is_file());
    assert!(dst.join("nested").join("deep").join("leaf").is_file());
    Ok(())
}

#[test]
fn nothing_to_include_removes_the_archive() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fill(&src, &["a", "b", "c"], 50)?;
    fill(&dst, &["a", "b", "c"], 50)?;

    let mut cfg = config(&src, &dst);
    cfg.overwrite = OverwritePolicy::Never;
    let descriptor = package_directory(&cfg, &src, &dst, false, 20_000)?;
    assert!(descriptor.is_empty());
    assert_eq!(descriptor.skipped_count, 3);
    assert!(!descriptor.archive_path.exists());
    assert!(!has_reserved(&src)?);
    Ok(())
}

#[test]
fn qualification_boundaries() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let policy = PackagingPolicy::default();

    let three = temp.path().join("three");
    fill(&three, &["a", "b", "c"], 1)?;
    assert!(DirectoryStat::scan(&three, 20_000).qualifies(&policy));

    let two_small = temp.path().join("two_small");
    fill(&two_small, &["a", "b"], 2_000)?;
    assert!(!DirectoryStat::scan(&two_small, 20_000).qualifies(&policy));

    let two_large = temp.path().join("two_large");
    fill(&two_large, &["a", "b"], 3_000)?;
    assert!(DirectoryStat::scan(&two_large, 20_000).qualifies(&policy));
    Ok(())
}

#[cfg(unix)]
#[test]
fn times_and_modes_survive_the_round_trip() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempfile::tempdir()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    let modes = [("r.txt", 0o640), ("x.sh", 0o755), ("p.key", 0o600)];
    let stamps = |i: usize| {
        (
            FileTime::from_unix_time(1_550_000_000 + i as i64 * 1000, 0),
            FileTime::from_unix_time(1_500_000_000 + i as i64 * 1000, 0),
        )
    };
    for (i, (name, mode)) in modes.iter().enumerate() {
        fill(&src, &[*name], 100 + i)?;
        let path = src.join(name);
        let (atime, mtime) = stamps(i);
        filetime::set_file_times(&path, atime, mtime)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(*mode))?;
    }

    let mut cfg = config(&src, &dst);
    cfg.preserve_times_and_permissions = true;
    let descriptor = package_directory(&cfg, &src, &dst, false, 20_000)?;
    assert_eq!(descriptor.file_count, 3);
    let ctx = EngineContext::with_config(cfg);
    CopyTask::archive(descriptor).run(&ctx);

    for (i, (name, mode)) in modes.iter().enumerate() {
        let (atime, mtime) = stamps(i);
        let got = fs::metadata(dst.join(name))?;
        let diff_m = mtime.unix_seconds() - FileTime::from_last_modification_time(&got).unix_seconds();
        let diff_a = atime.unix_seconds() - FileTime::from_last_access_time(&got).unix_seconds();
        assert!(diff_m.abs() <= 1, "{name} mtime off by {diff_m}s");
        assert!(diff_a.abs() <= 1, "{name} atime off by {diff_a}s");
        assert_eq!(got.permissions().mode() & 0o7777, *mode, "{name} mode");
    }
    Ok(())
}
