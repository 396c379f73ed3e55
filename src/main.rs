use mes_engine::{
    ClockMode, Engine, Expr, MidiClock, OpSequence, Operation, Scheduler, StageBackend,
    StageError, TempoMap, create_clock_channel,
};
use std::sync::Arc;

// Clock channel capacity: at 300 BPM and 480 PPQ the producer emits
// 9600 ticks/second, so 4096 covers well over a third of a second of
// consumer stall before ticks start deferring
const CLOCK_RINGBUFFER_CAPACITY: usize = 4096;

/// Stage that prints every primitive call, standing in for the renderer
struct ConsoleStage;

impl StageBackend for ConsoleStage {
    fn open_window(&mut self, width: u32, height: u32) {
        println!("[stage] open window {}x{}", width, height);
    }

    fn load_image(&mut self, slot: usize, path: &str) -> Result<(), StageError> {
        println!("[stage] load image `{}` into slot {}", path, slot);
        Ok(())
    }

    fn move_sprite(&mut self, slot: usize, x: i64, y: i64) {
        println!("[stage] sprite {} -> ({}, {})", slot, x, y);
    }

    fn show_sprite(&mut self, slot: usize, visible: bool) {
        println!("[stage] sprite {} visible={}", slot, visible);
    }

    fn print(&mut self, text: &str) {
        println!("[script] {}", text);
    }
}

fn demo_script() -> Arc<OpSequence> {
    OpSequence::new(vec![
        Operation::OpenWindow {
            width: Expr::int(640),
            height: Expr::int(400),
        },
        Operation::LoadImage {
            slot: Expr::int(0),
            path: Expr::str("dancer.png"),
        },
        Operation::Set {
            name: "x".to_string(),
            value: Expr::int(0),
        },
        Operation::MoveSprite {
            slot: Expr::int(0),
            x: Expr::var("x"),
            y: Expr::int(100),
        },
        Operation::Set {
            name: "x".to_string(),
            value: Expr::binary(mes_engine::BinaryOp::Add, Expr::var("x"), Expr::int(16)),
        },
        Operation::Wait(Expr::int(1)),
    ])
}

fn main() {
    env_logger::init();

    println!("=== mes-engine demo ===\n");

    let scheduler = Arc::new(Scheduler::new(Box::new(ConsoleStage)));
    let (clock_tx, clock_rx) = create_clock_channel(CLOCK_RINGBUFFER_CAPACITY);
    let mut engine = Engine::new(Arc::clone(&scheduler), clock_rx);

    // A MIDI-synced sequencer stepping a sprite across the screen, plus a
    // wall-clock one printing a heartbeat.
    scheduler.register_sequence(ClockMode::MidiSynced, demo_script());
    scheduler.register_sequence(
        ClockMode::WallClock,
        OpSequence::new(vec![
            Operation::Print(Expr::str("frame heartbeat")),
            Operation::Wait(Expr::int(5)),
        ]),
    );

    // Simulated audio playback: 120 BPM, irregular callback granularity.
    let tempo_map = TempoMap::new([(0, 500_000), (1920, 300_000)]);
    let mut clock = MidiClock::new(tempo_map, 480, clock_tx);

    let mut elapsed = 0.0;
    for i in 0..120 {
        // alternate short and long audio buffers
        elapsed += if i % 3 == 0 { 0.012 } else { 0.023 };
        clock.on_position(elapsed);
        engine.pump();
        engine.on_frame();
    }
    clock.playback_ended();
    engine.pump();

    println!("\nactive sequencers left: {}", scheduler.active_count());
}
