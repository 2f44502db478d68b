#![no_main]
#![no_std]

use laelaps as _;
use laelaps::{
    command::Dispatcher,
    config::{
        NetConfig, CONTROL_PERIOD_MS, DEVICE_ID, DISPATCH_PERIOD_MS, GPS_PERIOD_MS,
        GPS_RX_BUFSIZE, GPS_WINDOW_LEN, LINK_RX_BUFSIZE, LINK_TX_BUFSIZE, OUTBOX_BUFSIZE,
        RX_LINE_COLUMNS, RX_LINE_ROWS,
    },
    gps,
    lines::LineRing,
    net::{esp_at::RingLink, esp_at::EspAt, Client, Step},
    rb::{Consumer, Producer, Ringbuf},
    servo::{Servo, Servos, Sweep, PERIOD_US},
    store::PositionStore,
};

use defmt::{debug, error, info, trace};
use hal::pac::{Interrupt, NVIC};
use rtic_monotonics::{
    create_systick_token,
    systick::{ExtU32 as _, Systick},
};
use stm32l4xx_hal::{
    self as hal,
    gpio::{Alternate, PushPull, PA10, PA2, PA3, PA9},
    pac::{LPUART1, TIM2, USART1},
    prelude::*,
    pwm::{Pwm, C1, C2},
    serial,
    serial::{Config, Serial},
};

type LpUart1 = Serial<LPUART1, (PA2<Alternate<PushPull, 8>>, PA3<Alternate<PushPull, 8>>)>;
type Usart1 = Serial<USART1, (PA9<Alternate<PushPull, 7>>, PA10<Alternate<PushPull, 7>>)>;

type Link = RingLink<LINK_TX_BUFSIZE, LINK_RX_BUFSIZE>;

struct GpsUart {
    uart: LpUart1,
    rx_send: Producer<u8, GPS_RX_BUFSIZE>,
}

struct LinkUart {
    uart: Usart1,
    rx_send: Producer<u8, LINK_RX_BUFSIZE>,
    tx_recv: Consumer<u8, LINK_TX_BUFSIZE>,
    /// Byte taken from the pipe that the UART has not accepted yet.
    pending: Option<u8>,
}

struct PwmServos {
    one: Pwm<TIM2, C1>,
    two: Pwm<TIM2, C2>,
}

impl Servos for PwmServos {
    fn set_pulse_us(&mut self, servo: Servo, us: u16) {
        let channel = match servo {
            Servo::One => &mut self.one,
            Servo::Two => &mut self.two,
        };
        let duty = channel.get_max_duty() as u64 * us as u64 / PERIOD_US as u64;
        channel.set_duty(duty as u32);
    }
}

static STORE: PositionStore = PositionStore::new();
static INBOUND: LineRing<RX_LINE_ROWS, RX_LINE_COLUMNS> = LineRing::new();

fn pend_link_tx() {
    NVIC::pend(Interrupt::USART1);
}

fn now_ms() -> u64 {
    Systick::now().duration_since_epoch().to_millis() as u64
}

#[rtic::app(
    device = stm32l4xx_hal::pac,
    dispatchers = [EXTI2, EXTI3],
)]
mod app {
    use super::*;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        gps_uart: GpsUart,
        link_uart: LinkUart,
    }

    ////////////////////////////////////////////////////////////////////////////
    // Main thread tasks ///////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        trace!("init enter");

        let mut flash = cx.device.FLASH.constrain();
        let mut rcc = cx.device.RCC.constrain();
        let mut pwr = cx.device.PWR.constrain(&mut rcc.apb1r1);
        let clocks = rcc
            .cfgr
            .sysclk(16.MHz())
            .pclk1(16.MHz())
            .pclk2(16.MHz())
            .freeze(&mut flash.acr, &mut pwr);

        let mut gpioa = cx.device.GPIOA.split(&mut rcc.ahb2);

        // Create SysTick monotonic for task scheduling
        Systick::start(cx.core.SYST, clocks.sysclk().raw(), create_systick_token!());

        // Initialize LPUART1 for GPS (receive only)
        let tx = gpioa
            .pa2
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);
        let rx = gpioa
            .pa3
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);
        let mut uart = Serial::lpuart1(
            cx.device.LPUART1,
            (tx, rx),
            Config::default().baudrate(9600.bps()),
            clocks,
            &mut rcc.apb1r2,
        );
        uart.listen(serial::Event::Rxne);

        static GPS_RX: Ringbuf<u8, GPS_RX_BUFSIZE> = Ringbuf::new(None);
        let (gps_rx_send, gps_rx_recv) = GPS_RX.try_split().unwrap();
        let gps_uart = GpsUart {
            uart,
            rx_send: gps_rx_send,
        };

        // Initialize USART1 for the Wi-Fi coprocessor
        let tx = gpioa
            .pa9
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrh);
        let rx = gpioa
            .pa10
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrh);
        let mut uart = Serial::usart1(
            cx.device.USART1,
            (tx, rx),
            Config::default().baudrate(115_200.bps()),
            clocks,
            &mut rcc.apb2,
        );
        uart.listen(serial::Event::Rxne);

        static LINK_RX: Ringbuf<u8, LINK_RX_BUFSIZE> = Ringbuf::new(None);
        let (link_rx_send, link_rx_recv) = LINK_RX.try_split().unwrap();
        static LINK_TX: Ringbuf<u8, LINK_TX_BUFSIZE> = Ringbuf::new(Some(pend_link_tx));
        let (link_tx_send, link_tx_recv) = LINK_TX.try_split().unwrap();
        let link_uart = LinkUart {
            uart,
            rx_send: link_rx_send,
            tx_recv: link_tx_recv,
            pending: None,
        };

        // Dispatcher replies queue here until the network task flushes them
        static OUTBOX: Ringbuf<u8, OUTBOX_BUFSIZE> = Ringbuf::new(None);
        let (outbox_send, outbox_recv) = OUTBOX.try_split().unwrap();

        // Initialize TIM2 PWM for the servos, 50 Hz frame
        let c1 = gpioa
            .pa0
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);
        let c2 = gpioa
            .pa1
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);
        let (mut one, mut two) = cx
            .device
            .TIM2
            .pwm((c1, c2), 50.Hz(), clocks, &mut rcc.apb1r1);
        one.enable();
        two.enable();
        let mut servos = PwmServos { one, two };
        let _ = servos.set_servo(Servo::One, 0);
        let _ = servos.set_servo(Servo::Two, 0);

        // Spawn tasks
        gps_task::spawn(gps_rx_recv).map_err(|_| ()).unwrap();
        dispatch_task::spawn(outbox_send).map_err(|_| ()).unwrap();
        net_task::spawn(RingLink::new(link_tx_send, link_rx_recv), outbox_recv)
            .map_err(|_| ())
            .unwrap();
        control_task::spawn(servos).map_err(|_| ()).unwrap();

        info!("done initializing!");
        trace!("init exit");
        (
            Shared {},
            Local {
                gps_uart,
                link_uart,
            },
        )
    }

    #[idle]
    fn idle(_: idle::Context) -> ! {
        trace!("idle enter");

        loop {
            // Only sleep in release mode, since the debugger doesn't interact with sleep very nicely
            #[cfg(debug_assertions)]
            cortex_m::asm::nop();
            #[cfg(not(debug_assertions))]
            cortex_m::asm::wfi();
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Hardware interrupt handlers /////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    // Transfer GPS data into its pipe
    #[task(binds = LPUART1, priority = 10, local = [gps_uart])]
    fn on_gps_uart(cx: on_gps_uart::Context) {
        let gps = cx.local.gps_uart;
        // If the pipe is full, then drop the received value
        while let Ok(b) = gps.uart.read() {
            let _ = gps.rx_send.try_write(b);
        }
    }

    // Transfer coprocessor data to/from its pipes
    #[task(binds = USART1, priority = 10, local = [link_uart])]
    fn on_link_uart(cx: on_link_uart::Context) {
        let link = cx.local.link_uart;
        // Rxne
        while let Ok(b) = link.uart.read() {
            let _ = link.rx_send.try_write(b);
        }
        // Txe
        loop {
            let Some(b) = link.pending.take().or_else(|| link.tx_recv.try_read()) else {
                link.uart.unlisten(serial::Event::Txe);
                break;
            };
            if link.uart.write(b).is_err() {
                link.pending = Some(b);
                link.uart.listen(serial::Event::Txe);
                break;
            }
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Periodic tasks //////////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    // Decode the latest GGA fix
    #[task(priority = 2)]
    async fn gps_task(_cx: gps_task::Context, rx: Consumer<u8, GPS_RX_BUFSIZE>) {
        trace!("gps_task enter");

        let mut window = gps::Window::<GPS_WINDOW_LEN>::new();
        loop {
            if window.ingest_from(&rx, &STORE).is_none() {
                trace!("no complete GGA sentence, carrying {} bytes", window.carried().len());
            }
            Systick::delay(GPS_PERIOD_MS.millis()).await;
        }
    }

    // Act on received command lines
    #[task(priority = 1)]
    async fn dispatch_task(
        _cx: dispatch_task::Context,
        mut outbox: Producer<u8, OUTBOX_BUFSIZE>,
    ) {
        trace!("dispatch_task enter");

        let dispatcher = Dispatcher::new(DEVICE_ID);
        loop {
            dispatcher.poll(&INBOUND, &STORE, &mut outbox);
            Systick::delay(DISPATCH_PERIOD_MS.millis()).await;
        }
    }

    // Keep the ground station link up
    #[task(priority = 1)]
    async fn net_task(
        _cx: net_task::Context,
        link: Link,
        outbox: Consumer<u8, OUTBOX_BUFSIZE>,
    ) {
        trace!("net_task enter");

        let mut client = Client::new(EspAt::new(link), NetConfig::DEFAULT);
        loop {
            match client.step(now_ms(), &INBOUND, &outbox) {
                Step::Sleep(delay) => Systick::delay((delay.as_millis() as u32).millis()).await,
                Step::Halted(err) => {
                    error!("network task stopped: {}", err);
                    return;
                }
            }
        }
    }

    // Steering placeholder: sweep both servos
    #[task(priority = 1)]
    async fn control_task(_cx: control_task::Context, mut servos: PwmServos) {
        trace!("control_task enter");

        let mut sweeps = [(Servo::One, Sweep::down()), (Servo::Two, Sweep::up())];
        loop {
            let fix = STORE.read_fix();
            let target = STORE.read_target();
            debug!("fix {} target {}", fix, target);

            for (servo, sweep) in sweeps.iter_mut() {
                if let Some(angle) = sweep.next() {
                    let _ = servos.set_servo(*servo, angle);
                }
            }
            Systick::delay(CONTROL_PERIOD_MS.millis()).await;
        }
    }
}
