//! Desktop simulator for the envi-rs monitor core.
//!
//! Runs the full polling loop against synthetic sensors, console LEDs and a
//! console buzzer, with time accelerated so that several minutes of anomaly
//! logging pass in well under a second. A scripted button press toggles the
//! live view, which is what enables the alert outputs.
//!
//! # Options
//!
//! | Flag           | Effect                                     |
//! |----------------|--------------------------------------------|
//! | `--no-clock`   | Simulate a missing real-time clock at boot |
//! | `--fahrenheit` | Evaluate and report temperature in °F      |
//!
//! Set `RUST_LOG=debug` to see every window average and gate decision.

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use embassy_time::Instant;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use log::{error, info, warn};

use envi_rs::alerts::{AlertOutputs, BUZZER_TONE_HZ};
use envi_rs::app_state::Monitor;
use envi_rs::audit::LogAuditSink;
use envi_rs::clock::{Clock, ClockError, OffsetClock};
use envi_rs::config::MonitorConfig;
use envi_rs::input::{ButtonEvent, Debouncer};
use envi_rs::sensors::{EnvironmentSensor, LightSensor, SensorError};
use envi_rs::storage::RamStorage;
use envi_rs::units::TemperatureScale;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Simulated time that passes per loop iteration.
const SIM_STEP_MS: u64 = 250;

/// Total simulated run time.
const RUN_MINUTES: u64 = 15;

/// Button presses as `(down_ms, up_ms)` in simulated time.
const BUTTON_SCRIPT: &[(u64, u64)] = &[(2_000, 2_300), (12 * 60_000, 12 * 60_000 + 300)];

/// Size of the simulated EEPROM.
const EEPROM_SIZE: usize = 1024;

// ---------------------------------------------------------------------------
// Simulated time
// ---------------------------------------------------------------------------

/// Shared simulated millisecond counter.
#[derive(Clone)]
struct SimTime(Rc<Cell<u64>>);

impl SimTime {
    fn new() -> Self {
        Self(Rc::new(Cell::new(0)))
    }

    fn now_ms(&self) -> u64 {
        self.0.get()
    }

    fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

/// Wall clock anchored at process start and advanced by [`SimTime`].
struct SimClock {
    epoch_secs: u32,
    time: SimTime,
    available: bool,
}

impl SimClock {
    fn new(time: SimTime, available: bool) -> Self {
        let epoch_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        Self {
            epoch_secs,
            time,
            available,
        }
    }
}

impl Clock for SimClock {
    fn now_seconds(&mut self) -> Result<u32, ClockError> {
        if !self.available {
            return Err(ClockError::NotFound);
        }
        Ok(self.epoch_secs + (self.time.now_ms() / 1000) as u32)
    }
}

// ---------------------------------------------------------------------------
// Mock sensors
// ---------------------------------------------------------------------------

/// Generates synthetic readings that drift in and out of the alert bands.
struct MockSensorGenerator {
    time: SimTime,
    reads: u32,
}

impl MockSensorGenerator {
    fn new(time: SimTime) -> Self {
        Self { time, reads: 0 }
    }

    fn t(&self) -> f64 {
        self.time.now_ms() as f64 / 1000.0
    }
}

impl EnvironmentSensor for MockSensorGenerator {
    fn read_temperature_celsius(&mut self) -> Result<f32, SensorError> {
        self.reads += 1;
        // A faulty thermistor now and then.
        if self.reads % 97 == 0 {
            return Ok(f32::NAN);
        }
        let t = self.t();
        // Temperature: 19–29 °C, crosses the 25 °C limit every few minutes
        Ok((24.0 + 5.0 * (t / 150.0).sin() + 0.5 * (t / 37.0).cos()) as f32)
    }

    fn read_humidity_percent(&mut self) -> Result<f32, SensorError> {
        if self.reads % 211 == 0 {
            return Err(SensorError::ReadFailed {
                sensor: "humidity",
                details: "checksum mismatch",
            });
        }
        let t = self.t();
        // Humidity: 35–60 %
        Ok((47.5 + 12.5 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos()) as f32)
    }
}

impl LightSensor for MockSensorGenerator {
    fn read_raw(&mut self) -> u16 {
        let t = self.t();
        // LDR: 40–950 counts over a slow day/night swing
        (495.0 + 455.0 * (t / 240.0).sin()) as u16
    }
}

// ---------------------------------------------------------------------------
// Console outputs
// ---------------------------------------------------------------------------

/// LED that prints its transitions.
struct ConsoleLed {
    color: &'static str,
    lit: bool,
}

impl ConsoleLed {
    fn new(color: &'static str) -> Self {
        Self { color, lit: false }
    }

    fn set(&mut self, lit: bool) {
        if lit != self.lit {
            info!("LED {} {}", self.color, if lit { "ON" } else { "off" });
        }
        self.lit = lit;
    }
}

impl digital::ErrorType for ConsoleLed {
    type Error = Infallible;
}

impl OutputPin for ConsoleLed {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.set(true);
        Ok(())
    }
}

/// Buzzer that prints when the tone starts and stops.
struct ConsoleBuzzer {
    duty: u16,
}

impl pwm::ErrorType for ConsoleBuzzer {
    type Error = Infallible;
}

impl SetDutyCycle for ConsoleBuzzer {
    fn max_duty_cycle(&self) -> u16 {
        255
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
        match (self.duty, duty) {
            (0, d) if d > 0 => info!("Buzzer ON ({} Hz)", BUZZER_TONE_HZ),
            (d, 0) if d > 0 => info!("Buzzer off"),
            _ => {}
        }
        self.duty = duty;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted button
// ---------------------------------------------------------------------------

/// Active-low button pressed according to [`BUTTON_SCRIPT`].
struct ScriptedButton {
    time: SimTime,
}

impl ScriptedButton {
    fn pressed(&self) -> bool {
        let now = self.time.now_ms();
        BUTTON_SCRIPT
            .iter()
            .any(|&(down, up)| (down..up).contains(&now))
    }
}

impl digital::ErrorType for ScriptedButton {
    type Error = Infallible;
}

impl InputPin for ScriptedButton {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(!self.pressed())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(self.pressed())
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting envi-rs simulator");

    let no_clock = std::env::args().any(|arg| arg == "--no-clock");
    let fahrenheit = std::env::args().any(|arg| arg == "--fahrenheit");

    let mut config = MonitorConfig::default();
    if fahrenheit {
        config.scale = TemperatureScale::Fahrenheit;
    }
    info!(
        "Simulating {} minutes in {} ms steps, UTC offset {} h",
        RUN_MINUTES, SIM_STEP_MS, config.utc_offset_hours
    );

    let time = SimTime::new();
    let mut clock = OffsetClock::new(
        SimClock::new(time.clone(), !no_clock),
        config.utc_offset_hours,
    );
    let mut sensors = MockSensorGenerator::new(time.clone());
    let mut light = MockSensorGenerator::new(time.clone());
    let mut button = Debouncer::new(ScriptedButton { time: time.clone() });

    let outputs = AlertOutputs {
        temperature_led: ConsoleLed::new("green"),
        humidity_led: ConsoleLed::new("red"),
        light_led: ConsoleLed::new("yellow"),
        buzzer: ConsoleBuzzer { duty: 0 },
    };

    let mut monitor = match Monitor::new(
        config,
        outputs,
        RamStorage::<EEPROM_SIZE>::new(),
        LogAuditSink,
    ) {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("Failed to set up monitor: {}", e);
            std::process::exit(2);
        }
    };

    if monitor.boot(&mut clock).is_err() {
        error!("No clock found, halting");
        std::process::exit(1);
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    let end_ms = RUN_MINUTES * 60_000;
    while time.now_ms() < end_ms {
        // --- Button -------------------------------------------------------
        if let Ok(Some(ButtonEvent::Pressed)) = button.poll(Instant::from_millis(time.now_ms())) {
            let live = !monitor.live_view();
            info!("Button → live view {}", if live { "shown" } else { "hidden" });
            if let Err(e) = monitor.set_live_view(live) {
                warn!("Failed to switch view: {}", e);
            }
        }

        // --- Monitor tick -------------------------------------------------
        if let Err(e) = monitor.tick(&mut clock, &mut sensors, &mut light) {
            error!("Tick failed: {}", e);
        }

        time.advance(SIM_STEP_MS);
    }

    // -----------------------------------------------------------------------
    // Dump the log
    // -----------------------------------------------------------------------
    let log = monitor.anomaly_log();
    match log.len() {
        Ok(count) => info!("Anomaly log holds {} of {} records", count, log.capacity()),
        Err(e) => warn!("Failed to count anomaly records: {}", e),
    }
    info!("Timestamp\t\tTemp\tHumidity\tLight");
    for entry in log.chronological() {
        match entry {
            Ok(entry) => info!("{}", entry),
            Err(e) => {
                error!("Failed to read anomaly record: {}", e);
                break;
            }
        }
    }

    info!("Simulator exiting");
}
