use std::thread;
use std::time::Duration;

use clap::Parser;

use inktrails::render::{format_state, Frame, FrameRecorder};
use inktrails::sim::{SimConfig, SimError, Simulation};

/// Travelers-and-ink grid simulation. Traveler threads roam the grid and
/// paint it with a bounded ink supply that producer threads keep topping up;
/// the run is recorded as a sequence of PNG frames.
#[derive(Parser, Debug)]
#[command(name = "inktrails", version)]
struct Args {
    /// Grid rows
    #[arg(long, default_value_t = 20)]
    rows: usize,

    /// Grid columns
    #[arg(long, default_value_t = 20)]
    cols: usize,

    /// Number of traveler threads
    #[arg(long, default_value_t = 10)]
    travelers: usize,

    /// Number of ink producer threads
    #[arg(long, default_value_t = 3)]
    producers: usize,

    /// Capacity of each ink tank
    #[arg(long, default_value_t = 50)]
    max_level: u32,

    /// Units added by a single refill
    #[arg(long, default_value_t = 10)]
    max_add: u32,

    /// Starting red ink level
    #[arg(long, default_value_t = 20)]
    initial_red: u32,

    /// Starting green ink level
    #[arg(long, default_value_t = 10)]
    initial_green: u32,

    /// Starting blue ink level
    #[arg(long, default_value_t = 40)]
    initial_blue: u32,

    /// Pause between traveler steps, in milliseconds
    #[arg(long, default_value_t = 150)]
    step_pause_ms: u64,

    /// Starting producer refill interval, in milliseconds
    #[arg(long, default_value_t = 100)]
    refill_interval_ms: u64,

    /// Number of display refreshes to record
    #[arg(long, default_value_t = 120)]
    frames: usize,

    /// Delay between display refreshes, in milliseconds
    #[arg(long, default_value_t = 250)]
    frame_interval_ms: u64,

    /// Square pixel size of one rendered cell
    #[arg(long, default_value_t = 16)]
    cell_px: u32,

    /// Directory the rendered PNG frames are written to
    #[arg(long, default_value = "frames")]
    out_dir: String,
}

fn main() {
    env_logger::init();
    if let Err(err) = run(Args::parse()) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), SimError> {
    let config = SimConfig {
        rows: args.rows,
        cols: args.cols,
        travelers: args.travelers,
        producers: args.producers,
        max_level: args.max_level,
        max_add: args.max_add,
        initial_levels: [args.initial_red, args.initial_green, args.initial_blue],
        step_pause: Duration::from_millis(args.step_pause_ms),
        refill_interval: Duration::from_millis(args.refill_interval_ms),
        ..SimConfig::default()
    };
    log::info!(
        "{}x{} grid, {} travelers, {} producers, tanks capped at {}",
        config.rows,
        config.cols,
        config.travelers,
        config.producers,
        config.max_level
    );

    let mut sim = Simulation::new(config)?;
    sim.start()?;

    // Periodically snapshot the shared state the way a display refresh
    // would, and stop early once every traveler has reached a corner.
    let mut recorder = FrameRecorder::new(&args.out_dir, args.cell_px);
    for iteration in 0..args.frames {
        thread::sleep(Duration::from_millis(args.frame_interval_ms));
        let live = sim.live_travelers();
        let levels = sim.ink_levels();
        log::debug!("{}", format_state(live, levels));
        recorder.push(Frame {
            iteration,
            snapshot: sim.snapshot(),
            travelers: sim.traveler_board(),
            live,
            levels,
        });
        if live == 0 {
            log::info!("all travelers reached a corner after {} frames", iteration + 1);
            break;
        }
    }
    sim.shutdown();

    log::info!("rendering {} frames to {}/", recorder.len(), args.out_dir);
    recorder.render_all()?;
    Ok(())
}
