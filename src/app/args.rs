use clap::Parser;
use std::path::PathBuf;

use optimg::{
    config::{
        self, CompressorKind, MarkerBackend, OwnershipOverride, RunConfig, DEFAULT_LOCK_FILE,
    },
    template::CompressorTemplate,
};

#[derive(Parser, Debug)]
#[command(name = "optimize-image", author, version, about = "Optimize JPEG images in place", long_about = None)]
pub struct Args {
    #[arg(short, long)]
    pub verbose: bool,

    /// Compressor binary path, defaults to the internal mozjpeg encoder
    #[arg(short, long, value_name = "PATH", requires = "compressor_args")]
    pub compressor: Option<PathBuf>,

    /// Compressor command line, must contain {image} exactly once
    #[arg(
        short = 'l',
        long,
        value_name = "ARGS",
        value_parser = CompressorTemplate::parse,
        requires = "compressor",
        allow_hyphen_values = true
    )]
    pub compressor_args: Option<CompressorTemplate>,

    /// Owner of rewritten files (name or uid)
    #[arg(short, long, value_parser = config::resolve_uid)]
    pub owner: Option<u32>,

    /// Group of rewritten files (name or gid)
    #[arg(short, long, value_parser = config::resolve_gid)]
    pub group: Option<u32>,

    /// Mode of rewritten files, in octal
    #[arg(short, long, value_parser = config::parse_mode)]
    pub mode: Option<u32>,

    /// Excluded directories (glob on the directory name, repeatable)
    #[arg(short = 'x', long, value_name = "DIR", value_parser = parse_exclude)]
    pub exclude: Vec<String>,

    /// Force optimization without checking the last optimization time
    #[arg(short, long)]
    pub force: bool,

    /// Max execution time in minutes
    #[arg(short = 't', long, value_name = "MINUTES")]
    pub max_execution_time: Option<u64>,

    /// Quality of the internal encoder (1-100)
    #[arg(short, long, value_parser = config::parse_quality, default_value = "85")]
    pub quality: f32,

    /// Lock file guarding against concurrent runs
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LOCK_FILE)]
    pub lock_file: PathBuf,

    /// Keep markers in this JSON index instead of extended attributes
    #[arg(long, value_name = "FILE")]
    pub marker_index: Option<PathBuf>,

    /// Also match .JPG, .Jpeg and other case variants
    #[arg(short, long)]
    pub ignore_case: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Base path of images
    #[arg(value_name = "IMAGESPATH")]
    pub path: PathBuf,
}

fn parse_exclude(value: &str) -> Result<String, glob::PatternError> {
    glob::Pattern::new(value)?;
    Ok(value.to_string())
}

impl Args {
    pub fn into_config(self) -> RunConfig {
        let compressor = match (self.compressor, self.compressor_args) {
            (Some(program), Some(template)) => CompressorKind::External { program, template },
            _ => CompressorKind::InProcess {
                quality: self.quality,
            },
        };
        let markers = match self.marker_index {
            Some(index) => MarkerBackend::Index(index),
            None => MarkerBackend::Xattr,
        };

        RunConfig {
            root: self.path,
            compressor,
            ownership: OwnershipOverride {
                uid: self.owner,
                gid: self.group,
                mode: self.mode,
            },
            excludes: self.exclude,
            ignore_case: self.ignore_case,
            force: self.force,
            max_execution_time: self.max_execution_time.map(config::minutes),
            lock_file: self.lock_file,
            markers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Duration;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_use_internal_compressor() {
        let args = Args::try_parse_from(["optimize-image", "/srv/media"]).unwrap();
        let config = args.into_config();
        assert_eq!(config.root, PathBuf::from("/srv/media"));
        assert!(matches!(config.compressor, CompressorKind::InProcess { quality } if quality == 85.0));
        assert_eq!(config.ownership, OwnershipOverride::default());
        assert_eq!(config.markers, MarkerBackend::Xattr);
        assert_eq!(config.lock_file, PathBuf::from(DEFAULT_LOCK_FILE));
        assert_eq!(config.max_execution_time, None);
        assert!(!config.force);
    }

    #[test]
    fn test_full_command_line() {
        let args = Args::try_parse_from([
            "optimize-image",
            "-v",
            "-c",
            "/usr/bin/cjpeg",
            "-l",
            "-quality 84 {image}",
            "-o",
            "0",
            "-g",
            "0",
            "-m",
            "644",
            "-x",
            "cache",
            "-x",
            "tmp*",
            "-f",
            "-t",
            "30",
            "--marker-index",
            "/var/lib/optimg.json",
            "/srv/media",
        ])
        .unwrap();
        assert!(args.verbose);
        let config = args.into_config();
        match &config.compressor {
            CompressorKind::External { program, template } => {
                assert_eq!(program, &PathBuf::from("/usr/bin/cjpeg"));
                assert_eq!(template.as_str(), "-quality 84 {image}");
            }
            other => panic!("unexpected compressor {:?}", other),
        }
        assert_eq!(
            config.ownership,
            OwnershipOverride {
                uid: Some(0),
                gid: Some(0),
                mode: Some(0o644)
            }
        );
        assert_eq!(config.excludes, vec!["cache", "tmp*"]);
        assert!(config.force);
        assert_eq!(config.max_execution_time, Some(Duration::from_secs(1800)));
        assert_eq!(
            config.markers,
            MarkerBackend::Index(PathBuf::from("/var/lib/optimg.json"))
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        for argv in [
            vec!["optimize-image", "-m", "800", "/srv"],
            vec!["optimize-image", "-c", "/bin/cat", "/srv"],
            vec!["optimize-image", "-c", "/bin/cat", "-l", "--no-image", "/srv"],
            vec!["optimize-image", "-l", "{image}", "/srv"],
            vec!["optimize-image", "-o", "no-such-user-optimg", "/srv"],
            vec!["optimize-image", "-x", "[", "/srv"],
            vec!["optimize-image", "-q", "0", "/srv"],
            vec!["optimize-image"],
        ] {
            assert!(Args::try_parse_from(&argv).is_err(), "{:?}", argv);
        }
    }
}
