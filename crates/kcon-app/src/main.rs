//! Binary entry point: parses CLI flags, opens the KMS/tty/pty
//! collaborators, and drives the single-threaded priority event loop.

mod cli;
mod config;

use std::time::{Duration, Instant};

use clap::Parser;
use kcon_core::{Attr, Cell, DpmsLevel, Format, KmsBackend, PtyHandle, WinSize};
use kcon_grid::{Grid, RedrawEngine, TerminalAdapter, VtParser};
use kcon_input::{Dispatch, KeyboardPipeline, XkbKeymapBackend};
use kcon_platform::{DrmKms, PtyProcess, Supervisor, VtTransition};
use kcon_renderer::{render_cell, CellMetrics, FontdueGlyphCache};

use cli::Cli;
use config::Config;

fn main() {
    env_logger::init();
    match run() {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("kcon: {e}");
            std::process::exit(1);
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.help {
        eprintln!(
            "usage: kcon [-aA] [-f font] [-F boldfont] [-s size] [-d ms] [-r hz] [-i s] [-k layout] [-o options] [-v variant] [-p 0-3] [-w] [-h]"
        );
        std::process::exit(1);
    }
    cli.validate()?;
    let config = Config::from(&cli);

    let mut kms = DrmKms::open_first_available()?;

    let metrics = cell_metrics(&config);
    let cols = (kms.width() / metrics.width).max(1) as u16;
    let rows = (kms.height() / metrics.height).max(1) as u16;

    let grid = Grid::new(cols, rows, default_attr(&config));
    let adapter = TerminalAdapter::new(grid);
    let mut parser = VtParser::new(adapter, cols, rows);
    let mut redraw = RedrawEngine::new();

    let locale = std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LC_CTYPE"))
        .or_else(|_| std::env::var("LANG"))
        .unwrap_or_else(|_| "C".to_string());
    let keymap = XkbKeymapBackend::new(&config.keyboard_layout, &config.keyboard_variant, &config.keyboard_options, &locale)?;
    let mut keyboard = KeyboardPipeline::new(keymap);

    let mut glyphs = FontdueGlyphCache::load(config.font_path.as_deref(), config.bold_font_path.as_deref(), config.font_size)?;

    let (tty, _vt_num) = kcon_platform::RawTty::open_free_vt()?;
    let mut supervisor = Supervisor::new(tty)?;
    supervisor.acquire_display(&mut kms);

    let mut signals = kcon_platform::SignalPipe::install()?;
    let mut pty = PtyProcess::spawn(WinSize { cols, rows })?;

    let repeat_period = Duration::from_millis((1000 / config.repeat_rate_hz.max(1)) as u64);
    let repeat_delay = Duration::from_millis(config.repeat_delay_ms as u64);
    let idle_timeout = if config.idle_timeout_s == 0 { None } else { Some(Duration::from_secs(config.idle_timeout_s as u64)) };

    let mut next_repeat: Option<Instant> = None;
    let mut next_idle: Option<Instant> = idle_timeout.map(|d| Instant::now() + d);
    let mut read_buf = [0u8; 4096];

    'outer: loop {
        let timeout_ms = next_timeout_ms(next_repeat, next_idle);
        let signal_fds = signals.fds();
        let mut fds = [
            libc::pollfd { fd: signal_fds[0], events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: signal_fds[1], events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: signal_fds[2], events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: kms.fd(), events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: supervisor.tty().fd(), events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: pty.master_fd(), events: libc::POLLIN, revents: 0 },
        ];
        // Bands, highest priority first: 0 signals (one fd per watched
        // signal), 1 vblank, 2 keyboard, 3 key-repeat timer, 4 pty master,
        // 5 idle timer. The timer bands have no fd of their own; they are
        // serviced by deadline checks below rather than by `poll` readiness.
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err.into());
        }

        if fds[0].revents & libc::POLLIN != 0 || fds[1].revents & libc::POLLIN != 0 || fds[2].revents & libc::POLLIN != 0 {
            for sig in signals.drain() {
                match supervisor.handle_signal(sig, &mut kms) {
                    VtTransition::Released => {
                        // This session no longer owns input: cancel
                        // outstanding timers and reset keyboard state so
                        // nothing fires or stays "held" while backgrounded.
                        next_repeat = None;
                        next_idle = None;
                        keyboard.reset();
                        let _ = supervisor.tty().set_leds(0);
                    }
                    VtTransition::Acquired => {
                        next_idle = idle_timeout.map(|d| Instant::now() + d);
                        redraw.request_if_dirty(&parser.sink.grid, &mut kms);
                    }
                    VtTransition::Shutdown => break 'outer,
                }
            }
        }

        if fds[3].revents & libc::POLLIN != 0 {
            kms.drain_vblank_event();
            if supervisor.is_foreground() {
                let showcursor = parser.sink.showcursor;
                let grid = &mut parser.sink.grid;
                let snapshot: Vec<Cell> = grid.current().to_vec();
                let mut fb = kms.framebuffer();
                redraw.redraw(grid, |idx| {
                    let col = (idx % cols as usize) as u16;
                    let row = (idx / cols as usize) as u16;
                    render_cell(&mut fb, &mut glyphs, metrics, col, row, &snapshot[idx], showcursor, config.antialias, config.rotation, config.font_size);
                });
            }
        }

        if fds[4].revents & libc::POLLIN != 0 {
            let n = unsafe { libc::read(fds[4].fd, read_buf.as_mut_ptr() as *mut libc::c_void, read_buf.len()) };
            if n > 0 {
                for &byte in &read_buf[..n as usize] {
                    let pressed = byte & 0x80 == 0;
                    let scancode = (byte & 0x7f) as u32;
                    if let Some(dispatch) = keyboard.handle_scancode(scancode, pressed) {
                        apply_dispatch(dispatch, &mut pty, &mut supervisor, &mut kms, &mut next_repeat, repeat_delay);
                    }
                    if let Some(led_mask) = keyboard.take_led_update() {
                        let _ = supervisor.tty().set_leds(led_mask);
                    }
                    next_idle = idle_timeout.map(|d| Instant::now() + d);
                }
            }
        }

        if let Some(deadline) = next_repeat {
            if Instant::now() >= deadline {
                if let Some(dispatch) = keyboard.handle_repeat_fire() {
                    apply_dispatch(dispatch, &mut pty, &mut supervisor, &mut kms, &mut next_repeat, repeat_delay);
                    next_repeat = Some(Instant::now() + repeat_period);
                } else {
                    next_repeat = None;
                }
            }
        }

        if fds[5].revents & libc::POLLIN != 0 {
            match pty.read_nonblocking(&mut read_buf) {
                Ok(0) => break 'outer,
                Ok(n) => {
                    let was_empty = parser.sink.grid.dirty().is_empty();
                    let old_cursor = parser.sink.cursor;
                    parser.feed(&read_buf[..n]);
                    let new_cursor = parser.sink.cursor;
                    parser.sink.grid.move_cursor_flag(Some(old_cursor), new_cursor);
                    let response = parser.sink.take_pending_response();
                    if !response.is_empty() {
                        let _ = pty.write_nonblocking(&response);
                    }
                    if supervisor.is_foreground() {
                        redraw.arbitrate(was_empty, &parser.sink.grid, &mut kms);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => break 'outer,
            }
        }

        if let Some(deadline) = next_idle {
            if Instant::now() >= deadline {
                supervisor.request_dpms(&mut kms, DpmsLevel::Suspend);
                next_idle = None;
            }
        }
    }

    Ok(())
}

fn apply_dispatch(
    dispatch: Dispatch,
    pty: &mut PtyProcess,
    supervisor: &mut Supervisor,
    kms: &mut DrmKms,
    next_repeat: &mut Option<Instant>,
    repeat_delay: Duration,
) {
    match dispatch {
        Dispatch::Bytes(bytes) => {
            supervisor.request_dpms(kms, DpmsLevel::On);
            let _ = pty.write_nonblocking(&bytes);
            *next_repeat = Some(Instant::now() + repeat_delay);
        }
        Dispatch::VtSwitch(vt) => {
            supervisor.request_dpms(kms, DpmsLevel::On);
            let _ = supervisor.tty().activate(vt as i32);
        }
        Dispatch::Dpms(level) => {
            supervisor.request_dpms(kms, level);
        }
        Dispatch::Consumed => {
            supervisor.request_dpms(kms, DpmsLevel::On);
        }
    }
}

fn cell_metrics(config: &Config) -> CellMetrics {
    CellMetrics {
        width: (config.font_size as f32 * 0.6).round().max(1.0) as u32,
        height: config.font_size,
    }
}

fn default_attr(config: &Config) -> Attr {
    if config.white_background {
        Attr::new(0, 7, Format::empty())
    } else {
        Attr::default()
    }
}

fn next_timeout_ms(next_repeat: Option<Instant>, next_idle: Option<Instant>) -> libc::c_int {
    let now = Instant::now();
    let candidates = [next_repeat, next_idle].into_iter().flatten().map(|d| d.saturating_duration_since(now));
    match candidates.min() {
        Some(d) => d.as_millis().min(i32::MAX as u128) as libc::c_int,
        None => -1,
    }
}
