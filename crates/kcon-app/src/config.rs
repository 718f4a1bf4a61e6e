use std::path::PathBuf;

use kcon_core::Rotation;

use crate::cli::Cli;

/// Immutable, fully-validated configuration threaded through construction
/// of every component. Built once from parsed CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub antialias: bool,
    pub font_path: Option<PathBuf>,
    pub bold_font_path: Option<PathBuf>,
    pub font_size: u32,
    pub repeat_delay_ms: u32,
    pub repeat_rate_hz: u32,
    pub idle_timeout_s: u32,
    pub keyboard_layout: String,
    pub keyboard_options: String,
    pub keyboard_variant: String,
    pub rotation: Rotation,
    pub white_background: bool,
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Self {
            antialias: cli.antialias_effective(),
            font_path: cli.font_path.clone(),
            bold_font_path: cli.bold_font_path.clone(),
            font_size: cli.font_size,
            repeat_delay_ms: cli.repeat_delay_ms,
            repeat_rate_hz: cli.repeat_rate_hz,
            idle_timeout_s: cli.idle_timeout_s,
            keyboard_layout: cli.keyboard_layout.clone(),
            keyboard_options: cli.keyboard_options.clone(),
            keyboard_variant: cli.keyboard_variant.clone(),
            rotation: cli.rotation(),
            white_background: cli.white_background,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_background_flag_carries_through() {
        let cli = Cli {
            antialias: true,
            no_antialias: false,
            font_path: None,
            bold_font_path: None,
            font_size: 16,
            repeat_delay_ms: 200,
            repeat_rate_hz: 30,
            idle_timeout_s: 0,
            keyboard_layout: "us".into(),
            keyboard_options: String::new(),
            keyboard_variant: String::new(),
            rotation_steps: 2,
            white_background: true,
            help: false,
        };
        let config = Config::from(&cli);
        assert!(config.white_background);
        assert_eq!(config.rotation, Rotation::Cw180);
    }
}
