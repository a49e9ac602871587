//! Servo bank tick-path benchmark.
//!
//! The request + smoothing + snapshot sequence runs once per frame for
//! every servo; at 50 Hz it has milliseconds of headroom, but it is
//! the one loop that must never be allowed to grow quietly.

use aves_controller::servo::{DefaultPosition, OutputLocation, Servo, ServoBank};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn full_bank() -> ServoBank {
    let mut bank = ServoBank::new();
    for i in 0..8u8 {
        bank.insert(
            Servo::new(
                format!("joint_{i}"),
                format!("Joint {i}"),
                OutputLocation::Pwm {
                    module: 'A',
                    header: i,
                },
                1000,
                2000,
                0.9,
                i % 2 == 0,
                50,
                DefaultPosition::Center,
            )
            .unwrap(),
        )
        .unwrap();
    }
    bank
}

fn bench_frame_tick(c: &mut Criterion) {
    let mut bank = full_bank();
    let ids: Vec<String> = bank.iter().map(|s| s.id().to_string()).collect();

    c.bench_function("request_tick_snapshot_8_servos", |b| {
        let mut position = 0u16;
        b.iter(|| {
            position = (position + 37) % 1024;
            for id in &ids {
                bank.request(id, position).unwrap();
            }
            bank.tick_all();
            black_box(bank.snapshot());
        });
    });
}

fn bench_smoothing_convergence(c: &mut Criterion) {
    c.bench_function("smoothing_tick_single_servo", |b| {
        let mut servo = Servo::new(
            "bench",
            "bench",
            OutputLocation::Pwm {
                module: 'A',
                header: 0,
            },
            1000,
            2000,
            0.9,
            false,
            50,
            DefaultPosition::Min,
        )
        .unwrap();
        servo.move_to(1023).unwrap();
        b.iter(|| {
            servo.tick();
            black_box(servo.current_microseconds())
        });
    });
}

criterion_group!(benches, bench_frame_tick, bench_smoothing_convergence);
criterion_main!(benches);
