use apu_core::{
    Apu, ApuConfig, BufferedSink, ChannelId, ChipMask, NullSink, SampleBank, SoundChip,
};

fn apu_with_sink(config: &ApuConfig) -> (Apu, BufferedSink) {
    let sink = BufferedSink::new();
    let bank = SampleBank::new(vec![0xAA; 0x1000]);
    let apu = Apu::with_config(config, Box::new(sink.clone()), Box::new(bank)).unwrap();
    (apu, sink)
}

/// Square 1, triangle, noise and DPCM all sounding.
fn start_internal_channels(apu: &mut Apu) {
    apu.write(0x4015, 0x0F);
    apu.write(0x4000, 0xBF);
    apu.write(0x4002, 0xFD);
    apu.write(0x4003, 0x08);
    apu.write(0x4008, 0xFF);
    apu.write(0x400A, 0x80);
    apu.write(0x400B, 0x08);
    apu.write(0x400C, 0x3F);
    apu.write(0x400E, 0x04);
    apu.write(0x400F, 0x08);
    apu.write(0x4010, 0x4F);
    apu.write(0x4013, 0x10);
    apu.write(0x4015, 0x1F);
}

fn start_expansion_channels(apu: &mut Apu) {
    // VRC6 pulse 1
    apu.external_write(0x9000, 0x7F);
    apu.external_write(0x9001, 0x80);
    apu.external_write(0x9002, 0x80);
    // MMC5 square 1
    apu.external_write(0x5015, 0x01);
    apu.external_write(0x5000, 0xBF);
    apu.external_write(0x5002, 0x80);
    apu.external_write(0x5003, 0x08);
    // S5B tone A
    apu.external_write(0xC000, 0x00);
    apu.external_write(0xE000, 0x80);
    apu.external_write(0xC000, 0x07);
    apu.external_write(0xE000, 0x3E);
    apu.external_write(0xC000, 0x08);
    apu.external_write(0xE000, 0x0F);
    // VRC7 channel 1
    apu.external_write(0x9010, 0x30);
    apu.external_write(0x9030, 0x30);
    apu.external_write(0x9010, 0x10);
    apu.external_write(0x9030, 0xAC);
    apu.external_write(0x9010, 0x20);
    apu.external_write(0x9030, 0x18);
}

fn render(config: &ApuConfig, chunk: i32, frames: u32) -> Vec<i16> {
    let (mut apu, sink) = apu_with_sink(config);
    start_internal_channels(&mut apu);
    if config.expansion != ChipMask::NONE {
        start_expansion_channels(&mut apu);
    }

    let total = apu.frame_cycle_count() as i32 * frames as i32;
    let mut elapsed = 0;
    while elapsed < total {
        let step = chunk.min(total - elapsed);
        apu.add_time(step);
        apu.process();
        elapsed += step;
    }
    sink.take()
}

#[test]
fn identical_runs_produce_identical_pcm() {
    let config = ApuConfig {
        expansion: ChipMask::ALL,
        ..ApuConfig::default()
    };
    let first = render(&config, 1_000, 4);
    let second = render(&config, 1_000, 4);
    assert!(!first.is_empty());
    assert!(first.iter().any(|&s| s != 0));
    assert_eq!(first, second);
}

#[test]
fn every_frame_consumes_exactly_its_cycles() {
    let (mut apu, sink) = apu_with_sink(&ApuConfig::default());
    let frame = apu.frame_cycle_count() as i32;

    // Uneven chunks that add up to exactly five frames.
    let chunks = [frame - 1, 2, frame * 2 - 3, 1, frame + frame - 1, 2];
    assert_eq!(chunks.iter().sum::<i32>(), frame * 5);
    for chunk in chunks {
        apu.add_time(chunk);
        apu.process();
    }
    assert_eq!(sink.frames(), 5);
    assert_eq!(apu.frame_count(), 5);
    assert_eq!(apu.frame_cycles(), 0);
    assert_eq!(apu.cycles_to_run(), 0);
}

#[test]
fn negative_time_changes_nothing() {
    let mut apu = Apu::new(Box::new(NullSink), Box::new(SampleBank::default())).unwrap();
    apu.add_time(1_234);
    apu.process();
    let before = apu.debug_state();

    apu.add_time(-5);
    apu.process();
    assert_eq!(apu.cycles_to_run(), 0);
    assert_eq!(apu.debug_state(), before);
}

#[test]
fn status_reports_loaded_length_counters() {
    let (mut apu, _) = apu_with_sink(&ApuConfig::default());
    apu.write(0x4013, 0x10);
    apu.write(0x4015, 0x1F);
    apu.write(0x4003, 0x08);
    apu.write(0x4007, 0x08);
    apu.write(0x400B, 0x08);
    apu.write(0x400F, 0x08);
    assert_eq!(apu.read_4015() & 0x1F, 0x1F);

    apu.write(0x4015, 0x00);
    assert_eq!(apu.read_4015() & 0x1F, 0x00);
}

#[test]
fn five_step_write_clocks_immediately() {
    let (mut apu, _) = apu_with_sink(&ApuConfig::default());
    apu.write(0x4015, 0x01);
    apu.write(0x4000, 0x00);
    apu.write(0x4003, 0x18); // length 2

    apu.write(0x4017, 0x80);
    assert_eq!(apu.frame_sequencer_step(), 0);
    assert_eq!(apu.read_4015() & 0x01, 0x01);

    // The second write clocks the last length unit away with no time passed.
    apu.write(0x4017, 0x80);
    assert_eq!(apu.read_4015() & 0x01, 0x00);
    assert_eq!(apu.frame_cycles(), 0);

    // Four-step mode does not clock on write.
    apu.write(0x4003, 0x18);
    apu.write(0x4017, 0x00);
    assert_eq!(apu.read_4015() & 0x01, 0x01);
}

#[test]
fn reset_silences_everything() {
    let config = ApuConfig {
        expansion: ChipMask::ALL,
        ..ApuConfig::default()
    };
    let (mut apu, _) = apu_with_sink(&config);
    start_internal_channels(&mut apu);
    start_expansion_channels(&mut apu);
    apu.external_write(0x5011, 0x60);
    apu.add_time(10_000);
    apu.process();
    assert!(ChannelId::ALL.iter().any(|&id| apu.level(id) != 0));

    apu.reset();
    for id in ChannelId::ALL {
        assert_eq!(apu.level(id), 0, "{:?}", id);
        assert_eq!(apu.get_vol(id), 0, "{:?}", id);
    }
    assert_eq!(apu.mixer().samples_available(), 0);
    assert_eq!(apu.frame_cycles(), 0);
}

#[test]
fn chip_swap_rebuilds_in_fixed_order() {
    let (mut apu, _) = apu_with_sink(&ApuConfig::default());
    apu.add_time(5_000);
    apu.write(0x4000, 0x30);

    apu.set_external_sound(ChipMask::S5B | ChipMask::FDS | ChipMask::VRC6);
    assert_eq!(
        apu.active_chips(),
        vec![SoundChip::Vrc6, SoundChip::Fds, SoundChip::S5b]
    );
    assert_eq!(apu.frame_cycles(), 0);
    assert_eq!(apu.get_reg(SoundChip::Apu, 0x00), 0);

    apu.set_external_sound(ChipMask::from_bits(0xFF));
    assert_eq!(apu.active_chips(), SoundChip::EXPANSION_ORDER.to_vec());

    apu.set_external_sound(ChipMask::NONE);
    assert!(apu.active_chips().is_empty());
    // No chip claims the address: open bus.
    assert_eq!(apu.external_read(0x4090), 0x40);
}

#[test]
fn vrc6_duty_width_matches_register() {
    let config = ApuConfig {
        expansion: ChipMask::VRC6,
        ..ApuConfig::default()
    };
    for duty in [0u8, 2, 5, 7] {
        let (mut apu, _) = apu_with_sink(&config);
        apu.external_write(0x9000, (duty << 4) | 0x0F);
        apu.external_write(0x9001, 99);
        apu.external_write(0x9002, 0x80);

        let mut on_steps = 0;
        for _ in 0..16 {
            apu.add_time(100);
            apu.process();
            if apu.level(ChannelId::Vrc6Pulse1) == 15 {
                on_steps += 1;
            }
        }
        assert_eq!(on_steps, duty as usize + 1, "duty {}", duty);
    }
}

#[test]
fn expansion_reads_and_open_bus() {
    let config = ApuConfig {
        expansion: ChipMask::FDS | ChipMask::MMC5 | ChipMask::N163,
        ..ApuConfig::default()
    };
    let (mut apu, _) = apu_with_sink(&config);
    apu.external_write(0x4080, 0x80 | 0x20);
    assert_eq!(apu.external_read(0x4090), 0x60);

    apu.external_write(0x5015, 0x02);
    apu.external_write(0x5007, 0x08);
    assert_eq!(apu.read(0x5015), 0x02);

    apu.external_write(0xF800, 0x80);
    apu.external_write(0x4800, 0x12);
    apu.external_write(0x4800, 0x34);
    apu.external_write(0xF800, 0x01);
    assert_eq!(apu.external_read(0x4800), 0x34);

    assert_eq!(apu.external_read(0x6123), 0x61);
}

#[test]
fn pal_frames_are_longer() {
    let config = ApuConfig {
        machine: apu_core::TimingMode::Pal,
        ..ApuConfig::default()
    };
    let (mut apu, sink) = apu_with_sink(&config);
    assert_eq!(apu.frame_cycle_count(), 33_252);
    apu.add_time(33_252);
    apu.process();
    // 33252 * 44100 / 1662607 = 882.0
    assert!((881..=882).contains(&sink.len()), "{}", sink.len());
}

/// Every register a chip keeps, read back through `get_reg`. MMC5 keeps no
/// file, so its `$5015` status stands in.
fn register_files(apu: &mut Apu) -> Vec<(SoundChip, Vec<u8>)> {
    let mut files: Vec<(SoundChip, Vec<u8>)> = [
        (SoundChip::Vrc6, 12u16),
        (SoundChip::Vrc7, 0x40),
        (SoundChip::Fds, 16),
        (SoundChip::N163, 0x80),
        (SoundChip::S5b, 16),
    ]
    .into_iter()
    .map(|(chip, len)| (chip, (0..len).map(|reg| apu.get_reg(chip, reg)).collect()))
    .collect();
    files.push((SoundChip::Mmc5, vec![apu.read(0x5015)]));
    files
}

#[test]
fn chip_ports_do_not_alias() {
    let config = ApuConfig {
        expansion: ChipMask::ALL,
        ..ApuConfig::default()
    };
    let traffic: [(SoundChip, &[(u16, u8)]); 6] = [
        (SoundChip::Vrc6, &[(0x9000, 0x8F), (0x9001, 0x09), (0x9002, 0x80), (0xB000, 0x2A)]),
        (SoundChip::Vrc7, &[(0x9010, 0x30), (0x9030, 0x1F), (0x9010, 0x10), (0x9030, 0xAC)]),
        (SoundChip::Fds, &[(0x4080, 0xA0), (0x4082, 0x55), (0x4083, 0x04)]),
        (SoundChip::Mmc5, &[(0x5015, 0x01), (0x5000, 0xBF), (0x5003, 0x08)]),
        (SoundChip::N163, &[(0xF800, 0x80), (0x4800, 0x12), (0x4800, 0x34)]),
        (SoundChip::S5b, &[(0xC000, 0x08), (0xE000, 0x0F), (0xC000, 0x00), (0xE000, 0x80)]),
    ];

    for (target, writes) in traffic {
        let (mut apu, _) = apu_with_sink(&config);
        let before = register_files(&mut apu);
        for &(address, value) in writes {
            apu.external_write(address, value);
        }
        let after = register_files(&mut apu);

        for ((chip, old), (_, new)) in before.iter().zip(&after) {
            if *chip == target {
                assert_ne!(old, new, "{:?} ignored its own ports", chip);
            } else {
                assert_eq!(old, new, "{:?} writes leaked into {:?}", target, chip);
            }
        }
    }
}

#[test]
fn vrc6_keeps_playing_through_vrc7_traffic() {
    let config = ApuConfig {
        expansion: ChipMask::VRC6 | ChipMask::VRC7,
        ..ApuConfig::default()
    };
    let (mut apu, _) = apu_with_sink(&config);
    apu.external_write(0x9001, 0x09);
    apu.external_write(0x9002, 0x80);
    apu.external_write(0x9000, 0x8F);
    apu.add_time(2_000);
    apu.process();
    assert_eq!(apu.level(ChannelId::Vrc6Pulse1), 15);

    apu.external_write(0x9010, 0x30);
    apu.external_write(0x9030, 0x10);
    apu.add_time(2_000);
    apu.process();
    assert_eq!(apu.level(ChannelId::Vrc6Pulse1), 15);
    assert_eq!(apu.get_reg(SoundChip::Vrc6, 0), 0x8F);
}

#[test]
fn stopped_square_does_not_hold_its_level() {
    let (mut apu, _) = apu_with_sink(&ApuConfig::default());
    apu.write(0x4015, 0x01);
    apu.write(0x4000, 0xBF);
    apu.write(0x4002, 0xFD);
    apu.write(0x4003, 0x08);
    apu.add_time(10);
    apu.process();
    assert_eq!(apu.level(ChannelId::Square1), 15);

    apu.write(0x4002, 0x00);
    apu.write(0x4003, 0x00);
    apu.write(0x4015, 0x00);
    apu.add_time(100_000);
    apu.process();
    assert_eq!(apu.level(ChannelId::Square1), 0);
}
