//! Mount lifecycle and sector traffic against an in-memory volume.

use cartbridge_floppy::layout::*;
use cartbridge_floppy::{
    DriveState, FloppyConfig, FloppyEmulator, SECTOR_SIZE, cmd, create_st_image,
};
use cartbridge_proto::Frame;
use cartbridge_shm::SharedWindow;
use cartbridge_storage::{MemVolume, Volume};

const TOKEN: [u16; 2] = [0xCAFE, 0xF00D];

fn frame(command: u16, params: &[u16]) -> Frame {
    let mut words = TOKEN.to_vec();
    words.extend_from_slice(params);
    Frame::new(command, &words)
}

fn long(v: u32) -> [u16; 2] {
    [v as u16, (v >> 16) as u16]
}

fn volume_with_images() -> MemVolume {
    let mut vol = MemVolume::new();
    vol.mkdir("/floppies").unwrap();
    create_st_image(&mut vol, "/floppies", "work.st.rw", 80, 9, 2, None, false).unwrap();
    create_st_image(&mut vol, "/floppies", "game.st", 80, 9, 2, None, false).unwrap();
    vol
}

fn engine(image_a: &str, image_b: Option<&str>) -> FloppyEmulator {
    FloppyEmulator::new(FloppyConfig {
        folder: "/floppies".to_string(),
        image_a: Some(image_a.to_string()),
        image_b: image_b.map(str::to_string),
        boot_enabled: true,
        xbios_trap_enabled: false,
    })
}

#[test]
fn mount_mode_follows_the_filename_suffix() {
    let mut vol = volume_with_images();
    let mut win = SharedWindow::new();
    let mut emul = engine("work.st.rw", Some("game.st"));
    emul.init(&mut win, &mut vol);

    assert_eq!(emul.drive_state(0), DriveState::MountedRw);
    assert_eq!(emul.drive_state(1), DriveState::MountedRo);
    // Both drives claimed in the emulation mask; boot flag on, trap off.
    assert_eq!(win.shared_var(SVAR_EMULATION_MODE), 0b11);
    assert_eq!(win.shared_var(SVAR_BOOT_ENABLED), 0xFFFF_FFFF);
    assert_eq!(win.shared_var(SVAR_XBIOS_TRAP_ENABLED), 0);
}

#[test]
fn mount_publishes_the_bpb() {
    let mut vol = volume_with_images();
    let mut win = SharedWindow::new();
    let mut emul = engine("work.st.rw", None);
    emul.init(&mut win, &mut vol);

    let bpb = emul.drive_bpb(0);
    assert_eq!(bpb.record_size, 512);
    assert_eq!(bpb.sectors_per_track, 9);
    assert_eq!(bpb.side_count, 2);
    assert_eq!(bpb.sectors_per_cylinder, 18);
    // The published slot carries the same record, 16-bit fields in order.
    assert_eq!(win.read_word(BPB_SLOT_A), 512);
    assert_eq!(win.read_bytes(BPB_SLOT_A, 34), bpb.as_bytes());
    // Drive B untouched.
    assert_eq!(win.shared_var(SVAR_EMULATION_MODE), 0b01);
}

#[test]
fn missing_image_leaves_the_drive_unmounted() {
    let mut vol = volume_with_images();
    let mut win = SharedWindow::new();
    let mut emul = engine("nothere.st", None);
    emul.init(&mut win, &mut vol);
    assert_eq!(emul.drive_state(0), DriveState::Unmounted);
    assert_eq!(win.shared_var(SVAR_EMULATION_MODE), 0);
}

#[test]
fn sector_read_lands_swapped_in_the_transfer_buffer() {
    let mut vol = volume_with_images();
    // Stamp a recognizable pattern into logical sector 3.
    let mut image = vol.file_contents("/floppies/work.st.rw").unwrap();
    let pattern: Vec<u8> = (0..SECTOR_SIZE).map(|i| (i % 256) as u8).collect();
    image[3 * SECTOR_SIZE..4 * SECTOR_SIZE].copy_from_slice(&pattern);
    vol.put_file("/floppies/work.st.rw", &image).unwrap();

    let mut win = SharedWindow::new();
    let mut emul = engine("work.st.rw", None);
    emul.init(&mut win, &mut vol);

    emul.on_command(
        &frame(cmd::READ_SECTORS, &[512, 3, 0]),
        &mut win,
        &mut vol,
    );
    assert_eq!(win.read_block_swapped(IMAGE_BUFFER, SECTOR_SIZE), pattern);
}

#[test]
fn sector_write_round_trips() {
    let mut vol = volume_with_images();
    let mut win = SharedWindow::new();
    let mut emul = engine("work.st.rw", None);
    emul.init(&mut win, &mut vol);

    let payload: Vec<u8> = (0..SECTOR_SIZE).map(|i| (i as u8).wrapping_mul(3)).collect();
    // Sector data rides the payload as bus words, high byte first.
    let mut params = vec![512u16, 5, 0, 0];
    params.extend_from_slice(&long(0x0003_0000));
    params.extend(
        payload
            .chunks_exact(2)
            .map(|p| u16::from_be_bytes([p[0], p[1]])),
    );
    emul.on_command(&frame(cmd::WRITE_SECTORS, &params), &mut win, &mut vol);

    let image = vol.file_contents("/floppies/work.st.rw").unwrap();
    assert_eq!(&image[5 * SECTOR_SIZE..6 * SECTOR_SIZE], &payload[..]);

    // Reading the same sector returns the written bytes.
    emul.on_command(
        &frame(cmd::READ_SECTORS, &[512, 5, 0]),
        &mut win,
        &mut vol,
    );
    assert_eq!(win.read_block_swapped(IMAGE_BUFFER, SECTOR_SIZE), payload);
}

#[test]
fn read_only_drives_refuse_writes() {
    let mut vol = volume_with_images();
    let before = vol.file_contents("/floppies/game.st").unwrap();

    let mut win = SharedWindow::new();
    let mut emul = engine("game.st", None);
    emul.init(&mut win, &mut vol);
    assert_eq!(emul.drive_state(0), DriveState::MountedRo);

    let mut params = vec![512u16, 2, 0, 0];
    params.extend_from_slice(&long(0));
    params.extend(std::iter::repeat_n(0x4242u16, SECTOR_SIZE / 2));
    emul.on_command(&frame(cmd::WRITE_SECTORS, &params), &mut win, &mut vol);

    assert_eq!(vol.file_contents("/floppies/game.st").unwrap(), before);
    assert_eq!(emul.drive_state(0), DriveState::MountedRo);
}

#[test]
fn save_vectors_and_hardware_patch() {
    let mut vol = volume_with_images();
    let mut win = SharedWindow::new();
    let mut emul = engine("work.st.rw", None);
    emul.init(&mut win, &mut vol);

    emul.on_command(
        &frame(cmd::SAVE_VECTORS, &long(0x00FA_5678)),
        &mut win,
        &mut vol,
    );
    assert_eq!(win.read_long_swapped(OLD_XBIOS_TRAP), 0x00FA_5678);

    // A non-MegaSTE machine gets the cache toggling stubbed with no-ops.
    let mut params = Vec::new();
    params.extend_from_slice(&long(0x0001_0000)); // plain STE
    params.extend_from_slice(&long(0x0000_4100)); // function start
    params.extend_from_slice(&long(0x0000_4180)); // function end
    emul.on_command(&frame(cmd::SAVE_HARDWARE, &params), &mut win, &mut vol);
    for i in 0..8 {
        assert_eq!(win.read_word(0x4100 + i * 2), 0x4E71);
    }
    for i in 0..2 {
        assert_eq!(win.read_word(0x4180 + i * 2), 0x4E71);
    }

    // The MegaSTE keeps its code.
    let mut params = Vec::new();
    params.extend_from_slice(&long(0x0001_0010));
    params.extend_from_slice(&long(0x0000_4200));
    params.extend_from_slice(&long(0x0000_4280));
    emul.on_command(&frame(cmd::SAVE_HARDWARE, &params), &mut win, &mut vol);
    assert_eq!(win.read_word(0x4200), 0);
}

#[test]
fn bios_vector_links_into_the_chain_slot() {
    let mut vol = volume_with_images();
    let mut win = SharedWindow::new();
    let mut emul = engine("work.st.rw", None);
    emul.init(&mut win, &mut vol);

    let mut params = Vec::new();
    params.extend_from_slice(&long(0x00FC_0030)); // old BIOS vector
    params.extend_from_slice(&long(0x0001_3400)); // relocated handler
    params.extend_from_slice(&long(0x0000_0000));
    emul.on_command(&frame(cmd::SAVE_BIOS_VECTOR, &params), &mut win, &mut vol);
    assert_eq!(win.read_long_swapped(0x3400), 0x00FC_0030);
}

#[test]
fn foreign_commands_are_ignored() {
    let mut vol = volume_with_images();
    let mut win = SharedWindow::new();
    let mut emul = engine("work.st.rw", None);
    emul.init(&mut win, &mut vol);
    let mask = win.shared_var(SVAR_EMULATION_MODE);
    emul.on_command(&frame(0x0401, &long(0)), &mut win, &mut vol);
    assert_eq!(win.shared_var(SVAR_EMULATION_MODE), mask);
}
