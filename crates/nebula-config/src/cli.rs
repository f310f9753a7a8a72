//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// ROAM terrain demo command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "nebula-roam-demo", about = "Headless ROAM terrain tessellation demo")]
pub struct CliArgs {
    /// Grid cells per patch edge.
    #[arg(long)]
    pub patch_size: Option<u32>,

    /// LOD view radius.
    #[arg(long)]
    pub view_radius: Option<f32>,

    /// Initial triangle node pool size per render pass.
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Tessellation worker threads (0 = one per CPU).
    #[arg(long)]
    pub worker_threads: Option<usize>,

    /// Frames to simulate.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Height field seed.
    #[arg(long)]
    pub seed: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(size) = args.patch_size {
            self.terrain.patch_size = size;
        }
        if let Some(radius) = args.view_radius {
            self.terrain.view_radius = radius;
        }
        if let Some(pool) = args.pool_size {
            self.terrain.initial_pool_size = pool;
            self.terrain.max_pool_size = self.terrain.max_pool_size.max(pool);
        }
        if let Some(workers) = args.worker_threads {
            self.terrain.worker_threads = workers;
        }
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(seed) = args.seed {
            self.demo.seed = seed;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            patch_size: Some(64),
            seed: Some(9),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.terrain.patch_size, 64);
        assert_eq!(config.demo.seed, 9);
        assert_eq!(config.debug.log_level, "debug");
        // Non-overridden fields retain defaults
        assert_eq!(config.terrain.view_radius, 300.0);
        assert_eq!(config.demo.frames, 240);
    }

    #[test]
    fn test_pool_size_raises_ceiling() {
        let mut config = Config::default();
        let args = CliArgs {
            pool_size: Some(1 << 24),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.terrain.initial_pool_size, 1 << 24);
        assert_eq!(config.terrain.max_pool_size, 1 << 24);
    }

    #[test]
    fn test_cli_no_override() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from([
            "nebula-roam-demo",
            "--view-radius",
            "500",
            "--worker-threads",
            "2",
        ]);
        assert_eq!(args.view_radius, Some(500.0));
        assert_eq!(args.worker_threads, Some(2));
        assert!(args.frames.is_none());
    }
}
