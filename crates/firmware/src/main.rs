//! Embassy-based firmware for a MIDI to CV/gate/trigger converter running on the
//! [Nucleo-F767ZI development board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html).
//!
//! MIDI arrives on USART3 at 31250 baud and is echoed back out of the same port. The two pitch/modulation
//! voltages come from the on-chip DAC; gates, triggers, clock, reset and the panel LEDs are plain GPIO outputs.
//! All of the musical behavior lives in [`midi_cv_converter_lib`]; this crate only moves bytes and levels between
//! the hardware and the library's [`Converter`].

#![no_std]
#![no_main]

mod panel;

use crate::panel::Panel;
use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::{
    Config, bind_interrupts,
    dac::Dac,
    gpio::{Input, Level, Output, Pull, Speed},
    mode::Async,
    peripherals,
    time::Hertz,
    usart::{self, RingBufferedUartRx, Uart, UartTx},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex, signal::Signal};
use embassy_time::{Duration, Ticker, Timer};
use midi_cv_converter_lib::{
    codec::{RxProducer, RxRing},
    configuration::MemoryStore,
    converter::Converter,
    io::{INDICATOR_TICK, OutputBank},
};
use static_cell::StaticCell;

#[cfg(feature = "defmt-rtt")]
use defmt_rtt as _;
#[cfg(not(feature = "panic-probe"))]
use panic_halt as _;
#[cfg(feature = "panic-probe")]
use panic_probe as _;

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        USART3 => usart::InterruptHandler<peripherals::USART3>;
    }
);

type ConverterAsyncMutex =
    mutex::Mutex<CriticalSectionRawMutex, Converter<'static, OutputBank, MemoryStore>>;

const MIDI_BAUD_RATE: u32 = 31_250;

/// Indicator ticks per pulse tick.
const PULSE_DIVIDER: u8 = 4;

/// Indicator ticks per setup/voice service tick.
const SERVICE_DIVIDER: u8 = 16;

/// How many consecutive samples of a held select switch at power-on request a factory reset.
const FACTORY_RESET_SAMPLES: u8 = 10;
const FACTORY_RESET_SAMPLE_PERIOD: Duration = Duration::from_millis(20);

/// Raised whenever the converter may have queued bytes for the MIDI port.
static TX_PENDING: Signal<CriticalSectionRawMutex, ()> = Signal::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing MIDI to CV converter");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock, supplied by the ST-LINK
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            divq: None,
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
        config.rcc.sys = Sysclk::PLL1_P;
    }
    let p = embassy_stm32::init(config);

    // MIDI is 8-N-1, which matches the UART defaults apart from the rate
    let mut uart_config = usart::Config::default();
    uart_config.baudrate = MIDI_BAUD_RATE;
    // per the Nucleo user manual (UM1974), USART3 is routed to PD8 (TX) and PD9 (RX)
    let uart = unwrap!(Uart::new(
        p.USART3,
        p.PD9,
        p.PD8,
        Irqs,
        p.DMA1_CH3,
        p.DMA1_CH1,
        uart_config
    ));
    let (tx, rx) = uart.split();
    static RX_DMA_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();
    let rx = rx.into_ring_buffered(RX_DMA_BUFFER.init([0; 64]));

    // per RM0410, DAC channel 1 outputs on port A, pin 4 and channel 2 on pin 5
    let (cv1, cv2) = Dac::new(p.DAC1, p.DMA1_CH5, p.DMA1_CH6, p.PA4, p.PA5).split();

    let mut panel = Panel {
        cv1,
        cv2,
        jacks: [
            Output::new(p.PG0, Level::Low, Speed::Low), // gate 1
            Output::new(p.PG1, Level::Low, Speed::Low), // gate 2
            Output::new(p.PF0, Level::Low, Speed::Low), // trigger 1
            Output::new(p.PF1, Level::Low, Speed::Low), // trigger 2
            Output::new(p.PF2, Level::Low, Speed::Low), // trigger 3
            Output::new(p.PF3, Level::Low, Speed::Low), // trigger 4
            Output::new(p.PF4, Level::Low, Speed::Low), // clock
            Output::new(p.PF5, Level::Low, Speed::Low), // reset
        ],
        leds: [
            Output::new(p.PE2, Level::Low, Speed::Low),
            Output::new(p.PE3, Level::Low, Speed::Low),
            Output::new(p.PE4, Level::Low, Speed::Low),
            Output::new(p.PE5, Level::Low, Speed::Low),
            Output::new(p.PE6, Level::Low, Speed::Low),
            Output::new(p.PE7, Level::Low, Speed::Low),
            Output::new(p.PE8, Level::Low, Speed::Low),
            Output::new(p.PE9, Level::Low, Speed::Low),
            Output::new(p.PE10, Level::Low, Speed::Low),
            Output::new(p.PE11, Level::Low, Speed::Low),
            Output::new(p.PB0, Level::Low, Speed::Low), // green user LED: MIDI in
            Output::new(p.PB7, Level::Low, Speed::Low), // blue user LED: MIDI out
        ],
        test: Output::new(p.PG2, Level::Low, Speed::Low),
        setup: Input::new(p.PC13, Pull::None),
        select: Input::new(p.PD1, Pull::Up),
    };

    // bytes received from the MIDI port, waiting to be decoded
    static RX_RING: StaticCell<RxRing> = StaticCell::new();
    let (producer, consumer) = RX_RING.init(RxRing::new()).split();

    // TODO: back the configuration with a flash sector so settings survive a power cycle
    let mut converter = Converter::new(consumer, OutputBank::new(), MemoryStore::new());
    if factory_reset_requested(&panel).await {
        info!("Select held at power-on, restoring factory configuration");
        converter.factory_reset();
    }
    panel.refresh(converter.io_mut());

    static CONVERTER: StaticCell<ConverterAsyncMutex> = StaticCell::new();
    let converter = CONVERTER.init(mutex::Mutex::new(converter));

    unwrap!(spawner.spawn(midi_rx_task(rx, producer)));
    unwrap!(spawner.spawn(midi_tx_task(tx, converter)));
    unwrap!(spawner.spawn(engine_task(panel, converter)));
}

/// Samples the select switch a few times, reporting whether it stayed down throughout.
async fn factory_reset_requested(panel: &Panel) -> bool {
    for _ in 0..FACTORY_RESET_SAMPLES {
        if !panel.select_held() {
            return false;
        }
        Timer::after(FACTORY_RESET_SAMPLE_PERIOD).await;
    }
    true
}

/// Task responsible for moving bytes from the MIDI port into the receive ring.
///
/// The engine decodes them on its next tick.
#[embassy_executor::task]
async fn midi_rx_task(mut rx: RingBufferedUartRx<'static>, mut ring: RxProducer<'static>) -> ! {
    let mut buf = [0; 16];
    loop {
        match rx.read(&mut buf).await {
            Ok(n) => {
                for &byte in &buf[..n] {
                    ring.push_received_byte(byte);
                }
            }
            Err(e) => warn!("MIDI receive error: {}", e),
        }
    }
}

/// Task responsible for draining the converter's transmit queue onto the MIDI port.
#[embassy_executor::task]
async fn midi_tx_task(mut tx: UartTx<'static, Async>, converter: &'static ConverterAsyncMutex) -> ! {
    loop {
        TX_PENDING.wait().await;
        loop {
            // the lock is released before awaiting the UART
            let Some(byte) = converter.lock().await.drain_outgoing_byte() else {
                break;
            };
            if let Err(e) = tx.write(&[byte]).await {
                warn!("MIDI transmit error: {}", e);
            }
        }
    }
}

/// Task responsible for the converter's timebase.
///
/// Runs every [`INDICATOR_TICK`]: each run decodes whatever the receive ring holds and refreshes one LED, every
/// 4th advances the gate and trigger pulses and every 16th services the setup panel and voice retriggers. The panel
/// is then mirrored onto the pins.
#[embassy_executor::task]
async fn engine_task(mut panel: Panel, converter: &'static ConverterAsyncMutex) -> ! {
    let mut ticker = Ticker::every(INDICATOR_TICK);
    let mut tick: u8 = 0;
    loop {
        ticker.next().await;
        let mut converter = converter.lock().await;

        if converter.process_received_bytes() != 0 {
            TX_PENDING.signal(());
        }
        panel.sample(converter.io_mut());
        converter.io_mut().tick_indicators();
        if tick % PULSE_DIVIDER == 0 {
            converter.io_mut().tick_pulses();
        }
        if tick % SERVICE_DIVIDER == 0 {
            converter.service_tick();
        }
        panel.refresh(converter.io_mut());

        tick = tick.wrapping_add(1);
    }
}
