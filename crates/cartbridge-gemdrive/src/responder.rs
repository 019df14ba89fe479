use cartbridge_proto::{APP_GEMDRIVE, Frame, PayloadReader, app_of};
use cartbridge_shm::{SVAR_BUFFER_TYPE, SharedWindow, WINDOW_SIZE};
use cartbridge_storage::{DosDateTime, FileInfo, MediaError, OpenMode, Volume};

use crate::attr::{self, TosAttributes};
use crate::calls;
use crate::cmd;
use crate::dta::{DtaNode, DtaTable};
use crate::fd::{FIRST_FILE_DESCRIPTOR, FdTable};
use crate::glob;
use crate::layout::*;
use crate::path;
use crate::status::GemdosError;

/// Settings the responder is built from.
#[derive(Debug, Clone)]
pub struct GemDriveConfig {
    /// Volume folder serving as the emulated drive's root.
    pub root_folder: String,
    /// Drive letter the target mounts us under.
    pub drive_letter: char,
    /// Refuse every mutating trap.
    pub read_only: bool,
}

impl Default for GemDriveConfig {
    fn default() -> Self {
        Self {
            root_folder: "/hd".to_string(),
            drive_letter: 'C',
            read_only: false,
        }
    }
}

/// The hard-disk responder: services the target's file-system traps against
/// a volume subtree.
pub struct GemDrive {
    root: String,
    drive_letter: char,
    drive_num: u8,
    read_only: bool,
    default_path: String,
    dta: DtaTable,
    fds: FdTable,
}

impl GemDrive {
    pub fn new(cfg: GemDriveConfig) -> Self {
        let drive_num = (cfg.drive_letter.to_ascii_uppercase() as u8).wrapping_sub(b'A');
        Self {
            root: path::strip_trailing_slashes(&cfg.root_folder).to_string(),
            drive_letter: cfg.drive_letter,
            drive_num,
            read_only: cfg.read_only,
            default_path: "/".to_string(),
            dta: DtaTable::new(),
            fds: FdTable::new(),
        }
    }

    /// Publishes the responder's shared variables.
    pub fn init(&mut self, win: &mut SharedWindow) {
        win.set_shared_var(SVAR_FIRST_FILE_DESCRIPTOR, FIRST_FILE_DESCRIPTOR as u32);
        win.set_shared_var(SVAR_DRIVE_LETTER, self.drive_letter as u32);
        win.set_shared_var(SVAR_DRIVE_NUMBER, self.drive_num as u32);
        win.set_shared_var(SVAR_BUFFER_TYPE, 0);
        win.set_shared_var(SVAR_ENABLED, 0xFFFF_FFFF);
        log::debug!(
            "hard-disk responder up: drive {}: ({}) on {}",
            self.drive_letter,
            self.drive_num,
            self.root
        );
    }

    pub fn default_path(&self) -> &str {
        &self.default_path
    }

    pub fn open_files(&self) -> usize {
        self.fds.len()
    }

    pub fn tracked_dtas(&self) -> usize {
        self.dta.count()
    }

    /// Entry point from the dispatcher. Commands addressed elsewhere fall
    /// straight through.
    pub fn on_command<V: Volume>(&mut self, frame: &Frame, win: &mut SharedWindow, vol: &mut V) {
        if app_of(frame.command_id) != APP_GEMDRIVE {
            return;
        }
        let rd = frame.params();
        match frame.command_id {
            cmd::RESET => self.reset(win),
            cmd::SAVE_VECTORS => save_vectors(rd, win),
            cmd::SAVE_XBIOS_VECTOR => save_xbios_vector(rd, win),
            cmd::SHOW_VECTOR_CALL => show_vector_call(rd),
            cmd::REENTRY_LOCK => win.write_word(REENTRY_FLAG, 0xFFFF),
            cmd::REENTRY_UNLOCK => win.write_word(REENTRY_FLAG, 0),
            cmd::SET_SHARED_VAR => set_shared_var(rd, win),
            cmd::DGETDRV => log::debug!("Dgetdrv reports {:#06x}", rd.peek_u16()),
            cmd::DFREE => self.dfree(rd, win, vol),
            cmd::DGETPATH => self.dgetpath(rd, win),
            cmd::DSETPATH => self.dsetpath(rd, win, vol),
            cmd::DCREATE => self.dcreate(rd, win, vol),
            cmd::DDELETE => self.ddelete(rd, win, vol),
            cmd::FSETDTA => self.fsetdta(rd),
            cmd::DTA_EXIST => self.dta_exist(rd, win),
            cmd::DTA_RELEASE => self.dta_release(rd, win),
            cmd::FSFIRST => self.fsfirst(rd, win, vol),
            cmd::FSNEXT => self.fsnext(rd, win, vol),
            cmd::FOPEN => self.fopen(rd, win, vol),
            cmd::FCLOSE => self.fclose(rd, win),
            cmd::FCREATE => self.fcreate(rd, win, vol),
            cmd::FDELETE => self.fdelete(rd, win, vol),
            cmd::FSEEK => self.fseek(rd, win),
            cmd::FATTRIB => self.fattrib(rd, win, vol),
            cmd::FRENAME => self.frename(rd, win, vol),
            cmd::FDATETIME => self.fdatetime(rd, win, vol),
            cmd::READ_BUFFER => self.read_buffer(rd, win),
            cmd::WRITE_BUFFER => self.write_buffer(rd, win),
            cmd::WRITE_BUFFER_CHECK => self.write_buffer_check(rd, win),
            cmd::PEXEC => pexec(rd, win),
            cmd::SAVE_BASEPAGE => save_snapshot(rd, win, EXEC_BASEPAGE, BASEPAGE_SIZE),
            cmd::SAVE_EXEC_HEADER => save_snapshot(rd, win, EXEC_HEADER, 28),
            cmd::DEBUG => debug_report(frame, rd),
            _ => unknown_command(frame, rd),
        }
    }

    fn reset(&mut self, _win: &mut SharedWindow) {
        log::info!("responder reset: dropping every DTA and descriptor");
        self.dta.clear();
        self.fds.clear();
        // The display continues the target's boot sequence from here.
    }

    /// `<root>/<default>/<request>` for the string at the reader's cursor.
    fn local_path_at(&self, rd: &PayloadReader<'_>) -> String {
        let request = rd.string(MAX_FOLDER_LENGTH);
        path::local_path(&self.root, &self.default_path, &request)
    }

    fn dfree<V: Volume>(&mut self, rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        let unit = rd.peek_u16();
        log::debug!("Dfree on unit {unit} (0 = default)");
        match vol.free_space(&self.root) {
            Ok(space) => {
                win.write_long_swapped(DFREE_STRUCT, space.free_clusters);
                win.write_long_swapped(DFREE_STRUCT + 4, space.total_clusters);
                win.write_long_swapped(DFREE_STRUCT + 8, space.bytes_per_sector);
                win.write_long_swapped(DFREE_STRUCT + 12, space.sectors_per_cluster);
                win.write_long_swapped(DFREE_STATUS, GemdosError::Ok.longword());
            }
            Err(e) => {
                log::warn!("Dfree failed: {e}");
                win.write_long_swapped(DFREE_STATUS, GemdosError::Error.longword());
            }
        }
    }

    fn dgetpath(&mut self, rd: PayloadReader<'_>, win: &mut SharedWindow) {
        log::debug!("Dgetpath on drive {:#06x}: {}", rd.peek_u16(), self.default_path);
        let mut buf = [0u8; MAX_FOLDER_LENGTH];
        let back = path::back_slashes(&self.default_path);
        let back = path::clamp_to_folder_length(&back);
        buf[..back.len()].copy_from_slice(back.as_bytes());
        win.write_block_swapped(DEFAULT_PATH, &buf);
    }

    fn dsetpath<V: Volume>(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        rd.skip_long();
        rd.skip_long();
        rd.skip_long();
        let mut requested = rd.string(MAX_FOLDER_LENGTH);
        log::debug!("Dsetpath to {requested:?}");

        if requested
            .to_ascii_uppercase()
            .starts_with(&format!("{}:", self.drive_letter.to_ascii_uppercase()))
        {
            requested = requested[2..].to_string();
        }
        if !requested.starts_with(['\\', '/']) {
            requested = format!("{}/{}", self.default_path, requested);
        }
        let normalized = path::normalize(&path::forward_slashes(&requested));
        let full = path::collapse_slashes(&format!("{}/{}", self.root, normalized));

        match vol.stat(&full) {
            Ok(info) if info.is_dir() => {
                log::debug!("default path is now {normalized}");
                self.default_path = normalized;
                win.write_word(DSETPATH_STATUS, GemdosError::Ok.word());
            }
            _ => {
                log::debug!("no such directory: {full}");
                win.write_word(DSETPATH_STATUS, GemdosError::PathNotFound.word());
            }
        }
    }

    fn dcreate<V: Volume>(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        rd.skip_long();
        rd.skip_long();
        rd.skip_long();
        let target = self.local_path_at(&rd);
        log::debug!("Dcreate {target}");
        let code = if self.read_only {
            GemdosError::AccessDenied
        } else {
            match vol.mkdir(&target) {
                Ok(()) => GemdosError::Ok,
                Err(MediaError::PathNotFound) => GemdosError::PathNotFound,
                Err(e) => {
                    log::debug!("Dcreate failed: {e}");
                    GemdosError::AccessDenied
                }
            }
        };
        win.write_word(DCREATE_STATUS, code.word());
    }

    fn ddelete<V: Volume>(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        rd.skip_long();
        rd.skip_long();
        rd.skip_long();
        let target = self.local_path_at(&rd);
        log::debug!("Ddelete {target}");
        let code = if self.read_only {
            GemdosError::AccessDenied
        } else if !vol.stat(&target).map(|i| i.is_dir()).unwrap_or(false) {
            GemdosError::PathNotFound
        } else {
            match vol.remove(&target) {
                Ok(()) => GemdosError::Ok,
                Err(MediaError::Denied) => GemdosError::AccessDenied,
                Err(MediaError::PathNotFound) => GemdosError::PathNotFound,
                Err(e) => {
                    log::debug!("Ddelete failed: {e}");
                    GemdosError::Internal
                }
            }
        };
        win.write_word(DDELETE_STATUS, code.word());
    }

    fn fsetdta(&mut self, rd: PayloadReader<'_>) {
        let ndta = rd.peek_u32();
        if self.dta.contains(ndta) {
            // Left in place until the next enumeration rewinds it.
            log::trace!("DTA {ndta:#010x} already tracked");
        } else if !self.dta.insert(ndta) {
            log::warn!("Fsetdta could not track {ndta:#010x}");
        }
    }

    fn dta_exist(&mut self, rd: PayloadReader<'_>, win: &mut SharedWindow) {
        let ndta = rd.peek_u32();
        let known = self.dta.contains(ndta);
        log::debug!("DTA {ndta:#010x} exists: {known}");
        win.write_long_swapped(DTA_EXIST, if known { ndta } else { 0 });
    }

    fn dta_release(&mut self, rd: PayloadReader<'_>, win: &mut SharedWindow) {
        let ndta = rd.peek_u32();
        self.dta.release(ndta);
        clear_dta_record(win);
        win.write_long_swapped(DTA_RELEASE, self.dta.count() as u32);
    }

    fn fsfirst<V: Volume>(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        let ndta = rd.peek_u32();
        let mut attribs = rd.next_long();
        let spec_addr = rd.next_long();
        rd.skip_long();

        let raw = rd.string(MAX_FOLDER_LENGTH);
        let spec = path::forward_slashes(&raw);
        let spec = path::strip_drive_prefix(&spec);
        let spec = if spec.starts_with('/') {
            spec.to_string()
        } else {
            format!("{}/{}", self.default_path, spec)
        };
        let spec = path::collapse_slashes(&spec);
        let (_, folders, mut pattern) = path::split_full_path(&spec);
        let internal =
            path::collapse_slashes(&path::forward_slashes(&format!("{}/{}", self.root, folders)));

        // A `NAME.*` pattern means any extension; the matcher wants it bare.
        if pattern.ends_with(".*") {
            pattern.truncate(pattern.len() - 2);
        }
        if pattern.starts_with(['/', '\\']) {
            pattern.remove(0);
        }
        let pattern = pattern.trim_end_matches(' ').to_string();

        // Searches not looking for the volume label always accept plain
        // files, whose storage attribute is the archive bit.
        if attribs & TosAttributes::VOLUME_LABEL.bits() as u32 == 0 {
            attribs |= TosAttributes::ARCHIVE.bits() as u32;
        }

        log::debug!(
            "Fsfirst dta {ndta:#010x} spec {spec_addr:#010x}: dir {internal:?} pattern {pattern:?} filter {}",
            attr::display(TosAttributes::from_bits_truncate(attribs as u8))
        );

        if !self.dta.contains(ndta) && !self.dta.insert(ndta) {
            win.write_word(DTA_FOUND, GemdosError::Internal.word());
            clear_dta_record(win);
            return;
        }

        let matched = {
            let node = match self.dta.lookup(ndta) {
                Some(node) => node,
                None => return,
            };
            node.attribs = attribs;
            node.stream = vol.open_dir(&internal).ok();
            node.pattern = Some(pattern);
            next_match(node)
        };

        match matched {
            Some(entry) => self.enumeration_hit(win, &entry),
            None => self.enumeration_miss(win, ndta, GemdosError::FileNotFound),
        }
    }

    fn fsnext<V: Volume>(&mut self, rd: PayloadReader<'_>, win: &mut SharedWindow, _vol: &mut V) {
        let ndta = rd.peek_u32();
        log::debug!("Fsnext dta {ndta:#010x}");
        let live = match self.dta.lookup(ndta) {
            Some(node) if node.stream.is_some() => Some(next_match(node)),
            _ => None,
        };
        match live {
            Some(Some(entry)) => self.enumeration_hit(win, &entry),
            Some(None) => self.enumeration_miss(win, ndta, GemdosError::NoMoreFiles),
            None => {
                log::debug!("Fsnext without a live enumeration");
                self.enumeration_miss(win, ndta, GemdosError::Internal);
            }
        }
    }

    fn enumeration_hit(&mut self, win: &mut SharedWindow, entry: &FileInfo) {
        let base = if entry.alt_name.is_empty() {
            entry.name.as_str()
        } else {
            entry.alt_name.as_str()
        };
        let short = path::shorten_name(&path::upper_name(&path::filter_name(base)));
        log::debug!(
            "enumeration hit {short} attr {}",
            attr::display(attr::to_tos(entry.attributes))
        );
        write_dta_record(win, &short, entry);
    }

    fn enumeration_miss(&mut self, win: &mut SharedWindow, ndta: u32, code: GemdosError) {
        log::debug!("enumeration over for {ndta:#010x}: {code:?}");
        win.write_word(DTA_FOUND, code.word());
        self.dta.release(ndta);
        clear_dta_record(win);
    }

    fn fopen<V: Volume>(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        let mode = rd.peek_u16();
        rd.skip_long();
        rd.skip_long();
        rd.skip_long();
        let target = self.local_path_at(&rd);
        log::debug!("Fopen {target} mode {mode}");

        let open_mode = match mode {
            0 => OpenMode::READ,
            1 => OpenMode::WRITE,
            2 => OpenMode::READ | OpenMode::WRITE,
            _ => {
                win.write_long_swapped(FOPEN_HANDLE, GemdosError::AccessDenied.longword());
                return;
            }
        };
        if self.read_only && mode != 0 {
            win.write_long_swapped(FOPEN_HANDLE, GemdosError::AccessDenied.longword());
            return;
        }
        match vol.open(&target, open_mode) {
            Ok(handle) => {
                let fd = self.fds.add(target, handle, mode != 0);
                win.write_long_swapped(FOPEN_HANDLE, fd as u32);
            }
            Err(e) => {
                log::debug!("Fopen failed: {e}");
                win.write_long_swapped(FOPEN_HANDLE, GemdosError::FileNotFound.longword());
            }
        }
    }

    fn fclose(&mut self, rd: PayloadReader<'_>, win: &mut SharedWindow) {
        let fd = rd.peek_u16();
        log::debug!("Fclose {fd}");
        let code = if self.fds.remove(fd) {
            GemdosError::Ok
        } else {
            GemdosError::InvalidHandle
        };
        win.write_word(FCLOSE_STATUS, code.word());
    }

    fn fcreate<V: Volume>(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        let attr_bits = rd.peek_u16();
        rd.skip_long();
        rd.skip_long();
        rd.skip_long();
        let target = self.local_path_at(&rd);
        log::debug!(
            "Fcreate {target} attrs {}",
            attr::display(TosAttributes::from_bits_truncate(attr_bits as u8))
        );

        if self.read_only {
            win.write_word(FCREATE_HANDLE, GemdosError::AccessDenied.word());
            return;
        }
        match vol.open(
            &target,
            OpenMode::READ | OpenMode::WRITE | OpenMode::CREATE_ALWAYS,
        ) {
            Ok(handle) => {
                let wanted = attr::to_fs(TosAttributes::from_bits_truncate(attr_bits as u8));
                if let Err(e) = vol.set_attributes(&target, wanted, attr::SETTABLE) {
                    log::debug!("Fcreate attribute set failed: {e}");
                }
                let fd = self.fds.add(target, handle, true);
                win.write_word(FCREATE_HANDLE, fd);
            }
            Err(e) => {
                log::debug!("Fcreate failed: {e}");
                win.write_word(FCREATE_HANDLE, GemdosError::PathNotFound.word());
            }
        }
    }

    fn fdelete<V: Volume>(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        rd.skip_long();
        rd.skip_long();
        rd.skip_long();
        let target = self.local_path_at(&rd);
        log::debug!("Fdelete {target}");

        let code = if self.read_only {
            GemdosError::AccessDenied
        } else if self.fds.find_by_path(&target).is_some() {
            log::debug!("refusing to delete an open file");
            GemdosError::AccessDenied
        } else {
            match vol.remove(&target) {
                Ok(()) => GemdosError::Ok,
                // Deleting a file that is already gone reports success; the
                // target's cleanup paths depend on this.
                Err(MediaError::NotFound) => GemdosError::Ok,
                Err(MediaError::Denied) => GemdosError::AccessDenied,
                Err(MediaError::PathNotFound) => GemdosError::PathNotFound,
                Err(e) => {
                    log::debug!("Fdelete failed: {e}");
                    GemdosError::Internal
                }
            }
        };
        win.write_long_swapped(FDELETE_STATUS, code.longword());
    }

    fn fseek(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow) {
        let fd = rd.peek_u16();
        let off = rd.next_long() as i32 as i64;
        let mode = rd.next_long_u16();

        let Some(file) = self.fds.find_by_fd(fd) else {
            win.write_long_swapped(FSEEK_STATUS, GemdosError::InvalidHandle.longword());
            return;
        };
        let size = file.handle.size() as i64;
        let current = file.offset as i64;
        let new_offset = match mode {
            0 => off.clamp(0, size),
            1 => (current + off).clamp(0, size),
            2 => {
                if off <= 0 {
                    (size + off).max(0)
                } else {
                    current
                }
            }
            _ => {
                win.write_long_swapped(FSEEK_STATUS, GemdosError::AccessDenied.longword());
                return;
            }
        };
        file.offset = new_offset as u64;
        log::debug!("Fseek {fd} mode {mode} -> offset {new_offset:#x}");
        win.write_long_swapped(FSEEK_STATUS, new_offset as u32);
    }

    fn fattrib<V: Volume>(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        let flag = rd.peek_u16();
        let new_bits = rd.next_long_u16();
        rd.skip_long();
        rd.skip_long();
        let target = self.local_path_at(&rd);
        log::debug!("Fattrib {target} flag {flag} bits {new_bits:#x}");

        let code = match vol.stat(&target) {
            Err(e) => {
                log::debug!("Fattrib stat failed: {e}");
                GemdosError::FileNotFound.longword()
            }
            Ok(info) => {
                let current = attr::to_tos(info.attributes).bits() as u32;
                if flag == 0 {
                    current
                } else if self.read_only {
                    GemdosError::AccessDenied.longword()
                } else {
                    let wanted = attr::to_fs(TosAttributes::from_bits_truncate(new_bits as u8));
                    match vol.set_attributes(&target, wanted, attr::SETTABLE) {
                        Ok(()) => current,
                        Err(e) => {
                            log::debug!("Fattrib set failed: {e}");
                            GemdosError::AccessDenied.longword()
                        }
                    }
                }
            }
        };
        win.write_long_swapped(FATTRIB_STATUS, code);
    }

    fn frename<V: Volume>(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        rd.skip_long();
        rd.skip_long();
        rd.skip_long();
        let src = rd.string(MAX_FOLDER_LENGTH);
        let dst = rd.string_at(MAX_FOLDER_LENGTH / 2, MAX_FOLDER_LENGTH);
        log::debug!("Frename {src:?} -> {dst:?}");

        let (src_drive, _, _) = path::split_full_path(&src);
        let (dst_drive, _, _) = path::split_full_path(&dst);
        let code = if !src_drive.eq_ignore_ascii_case(&dst_drive) {
            log::debug!("rename across drives refused");
            GemdosError::PathNotFound
        } else if self.read_only {
            GemdosError::AccessDenied
        } else {
            let from = path::local_path(&self.root, &self.default_path, &src);
            let to = path::local_path(&self.root, &self.default_path, &dst);
            match vol.rename(&from, &to) {
                Ok(()) => GemdosError::Ok,
                Err(MediaError::Denied) => GemdosError::AccessDenied,
                Err(MediaError::PathNotFound) => GemdosError::PathNotFound,
                Err(MediaError::NotFound) => GemdosError::FileNotFound,
                Err(MediaError::Exists) => GemdosError::AccessDenied,
                Err(e) => {
                    log::debug!("Frename failed: {e}");
                    GemdosError::Internal
                }
            }
        };
        win.write_long_swapped(FRENAME_STATUS, code.longword());
    }

    fn fdatetime<V: Volume>(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow, vol: &mut V) {
        let flag = rd.peek_u16();
        let fd = rd.next_long_u16();
        let date = rd.next_long_u16();
        let time = rd.next_word();
        log::debug!("Fdatetime flag {flag} fd {fd} date {date:#06x} time {time:#06x}");

        let Some(target) = self.fds.find_by_fd(fd).map(|f| f.path.clone()) else {
            write_datetime(win, GemdosError::InvalidHandle, 0, 0);
            return;
        };
        if flag == 0 {
            match vol.stat(&target) {
                Ok(info) => write_datetime(win, GemdosError::Ok, info.stamp.date, info.stamp.time),
                Err(e) => {
                    log::debug!("Fdatetime stat failed: {e}");
                    write_datetime(win, GemdosError::FileNotFound, 0, 0);
                }
            }
        } else {
            match vol.set_times(&target, DosDateTime::new(date, time)) {
                Ok(()) => write_datetime(win, GemdosError::Ok, 0, 0),
                Err(e) => {
                    log::debug!("Fdatetime set failed: {e}");
                    write_datetime(win, GemdosError::FileNotFound, 0, 0);
                }
            }
        }
    }

    fn read_buffer(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow) {
        let fd = rd.peek_u16();
        let total = rd.next_long();
        let pending = rd.next_long();
        log::debug!("read round fd {fd}: total {total:#x}, pending {pending:#x}");

        let Some(file) = self.fds.find_by_fd(fd) else {
            win.write_long_swapped(READ_BYTES, GemdosError::InvalidHandle.longword());
            return;
        };
        if file.handle.seek(file.offset).is_err() {
            win.write_long_swapped(READ_BYTES, GemdosError::Internal.longword());
            return;
        }
        let to_read = (pending as usize).min(READ_BUFFER_SIZE);
        let mut buf = vec![0u8; to_read];
        match file.handle.read(&mut buf) {
            Ok(n) => {
                file.offset += n as u64;
                win.write_bytes(READ_BUFFER, &buf[..n]);
                win.swap_block16(READ_BUFFER, to_read);
                win.write_long_swapped(READ_BYTES, n as u32);
            }
            Err(e) => {
                log::debug!("read round failed: {e}");
                win.write_long_swapped(READ_BYTES, GemdosError::Internal.longword());
            }
        }
    }

    fn write_buffer(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow) {
        let fd = rd.peek_u16();
        let total = rd.next_long();
        let pending = rd.next_long();
        rd.skip_long();
        log::debug!("write round fd {fd}: total {total:#x}, pending {pending:#x}");

        if self.read_only {
            win.write_long_swapped(WRITE_BYTES, GemdosError::AccessDenied.longword());
            return;
        }
        let Some(file) = self.fds.find_by_fd(fd) else {
            win.write_long_swapped(WRITE_BYTES, GemdosError::InvalidHandle.longword());
            return;
        };
        if !file.writable {
            win.write_long_swapped(WRITE_BYTES, GemdosError::AccessDenied.longword());
            return;
        }
        if file.handle.seek(file.offset).is_err() {
            win.write_long_swapped(WRITE_BYTES, GemdosError::Internal.longword());
            return;
        }
        let staged = rd.rest_bytes_swapped();
        let count = (pending as usize).min(WRITE_BUFFER_SIZE).min(staged.len());
        match file.handle.write(&staged[..count]) {
            Ok(written) => {
                // The offset moves only on the confirming check command.
                win.write_long_swapped(WRITE_BYTES, written as u32);
            }
            Err(e) => {
                log::debug!("write round failed: {e}");
                win.write_long_swapped(WRITE_BYTES, GemdosError::Internal.longword());
            }
        }
    }

    fn write_buffer_check(&mut self, mut rd: PayloadReader<'_>, win: &mut SharedWindow) {
        let fd = rd.peek_u16();
        let forward = rd.next_long();
        let Some(file) = self.fds.find_by_fd(fd) else {
            win.write_long_swapped(WRITE_CONFIRM_STATUS, GemdosError::InvalidHandle.longword());
            return;
        };
        file.offset += forward as u64;
        log::debug!("write confirmed: fd {fd} advances {forward:#x} to {:#x}", file.offset);
        win.write_long_swapped(WRITE_CONFIRM_STATUS, GemdosError::Ok.longword());
    }
}

/// Walks the node's stream to the next entry passing the dot, pattern and
/// attribute filters.
fn next_match(node: &mut DtaNode) -> Option<FileInfo> {
    let filter = if node.attribs & TosAttributes::VOLUME_LABEL.bits() as u32 == 0 {
        node.attribs | TosAttributes::ARCHIVE.bits() as u32
    } else {
        node.attribs
    };
    let pattern = node.pattern.clone().unwrap_or_default();
    let stream = node.stream.as_mut()?;
    loop {
        match stream.next_entry() {
            Ok(Some(entry)) => {
                if entry.name.starts_with('.') {
                    continue;
                }
                if !glob::matches(&pattern, &entry.name) {
                    continue;
                }
                let bits = attr::to_tos(entry.attributes).bits() as u32;
                if filter & bits == 0 {
                    continue;
                }
                return Some(entry);
            }
            Ok(None) => return None,
            Err(e) => {
                log::debug!("directory stream failed: {e}");
                return None;
            }
        }
    }
}

fn clear_dta_record(win: &mut SharedWindow) {
    win.write_bytes(DTA_TRANSFER, &[0u8; DTA_TRANSFER_SIZE]);
}

/// Lays the found entry out as the 44-byte record the target consumes: the
/// internal name region raw, the visible filename region byte-swapped, the
/// length with its halves swapped.
fn write_dta_record(win: &mut SharedWindow, short: &str, entry: &FileInfo) {
    clear_dta_record(win);
    win.write_word(DTA_FOUND, 0);

    let mut name12 = [0u8; 12];
    let n = short.len().min(11);
    name12[..n].copy_from_slice(&short.as_bytes()[..n]);
    win.write_bytes(DTA_TRANSFER, &name12);

    win.write_long(DTA_TRANSFER + 12, 0); // directory position
    win.write_word(DTA_TRANSFER + 16, 0); // byte within cluster
    win.write_word(DTA_TRANSFER + 18, 0); // current cluster

    let bits = attr::to_tos(entry.attributes).bits();
    win.write_bytes(DTA_TRANSFER + 20, &[bits, bits]);
    win.write_word(DTA_TRANSFER + 22, entry.stamp.time);
    win.write_word(DTA_TRANSFER + 24, entry.stamp.date);
    win.write_long_swapped(DTA_TRANSFER + 26, entry.size as u32);

    let mut name14 = [0u8; 14];
    let n = short.len().min(13);
    name14[..n].copy_from_slice(&short.as_bytes()[..n]);
    win.write_bytes(DTA_TRANSFER + 30, &name14);
    win.swap_block16(DTA_TRANSFER + 30, 14);
}

fn write_datetime(win: &mut SharedWindow, code: GemdosError, date: u16, time: u16) {
    win.write_long_swapped(FDATETIME_STATUS, code.longword());
    win.write_long_swapped(FDATETIME_DATE, date as u32);
    win.write_long_swapped(FDATETIME_TIME, time as u32);
}

/// Links the supplied old trap vector into the relocated handler: the low
/// half of the handler address locates its chain slot in the firmware image.
fn save_vectors(mut rd: PayloadReader<'_>, win: &mut SharedWindow) {
    let old_vector = rd.peek_u32();
    let handler = rd.next_long();
    let chain_slot = (handler & 0xFFFF) as usize;
    log::debug!("linking old trap vector {old_vector:#010x} at {chain_slot:#06x}");
    win.write_long_swapped(chain_slot, old_vector);
}

fn save_xbios_vector(rd: PayloadReader<'_>, win: &mut SharedWindow) {
    let old_vector = rd.peek_u32();
    log::debug!("recording old XBIOS vector {old_vector:#010x}");
    win.write_long_swapped(OLD_XBIOS_TRAP, old_vector);
}

fn show_vector_call(rd: PayloadReader<'_>) {
    let call = rd.peek_u16();
    if calls::is_chatty(call) {
        log::trace!("trap {} ({call:#x})", calls::call_name(call));
    } else {
        log::debug!("trap {} ({call:#x})", calls::call_name(call));
    }
}

fn set_shared_var(mut rd: PayloadReader<'_>, win: &mut SharedWindow) {
    let index = rd.peek_u32() as usize;
    let value = rd.next_long();
    if cartbridge_shm::SHARED_VARIABLES_OFFSET + index * 4 + 4 > WINDOW_SIZE {
        log::warn!("shared variable index {index} out of range");
        return;
    }
    win.set_shared_var(index, value);
}

fn pexec(mut rd: PayloadReader<'_>, win: &mut SharedWindow) {
    let mode = rd.peek_u16();
    let stack = rd.next_long();
    let fname = rd.next_long();
    let cmdline = rd.next_long();
    let envstr = rd.next_long();
    log::debug!("Pexec mode {mode} stack {stack:#010x} fname {fname:#010x}");
    win.write_word(PEXEC_MODE, mode);
    win.write_long_swapped(PEXEC_STACK_ADDR, stack);
    win.write_long_swapped(PEXEC_FNAME, fname);
    win.write_long_swapped(PEXEC_CMDLINE, cmdline);
    win.write_long_swapped(PEXEC_ENVSTR, envstr);
}

/// Copies a structure snapshot out of the payload into its window slot, as
/// the bytes arrived.
fn save_snapshot(mut rd: PayloadReader<'_>, win: &mut SharedWindow, offset: usize, len: usize) {
    rd.skip_long();
    rd.skip_long();
    rd.skip_long();
    let bytes = rd.rest_bytes();
    let n = bytes.len().min(len);
    win.write_bytes(offset, &bytes[..n]);
    log::debug!("snapshot of {n} bytes stored at {offset:#06x}");
}

fn debug_report(frame: &Frame, mut rd: PayloadReader<'_>) {
    let d3 = rd.peek_u32();
    let d4 = rd.next_long();
    let d5 = rd.next_long();
    log::debug!("debug d3 {d3:#010x} d4 {d4:#010x} d5 {d5:#010x}");
    if frame.payload_size <= 20 {
        log::debug!("debug d6 {:#010x}", rd.next_long());
    } else {
        rd.skip_long();
        dump_payload(&rd.rest_bytes());
    }
}

fn unknown_command(frame: &Frame, mut rd: PayloadReader<'_>) {
    let d3 = rd.peek_u32();
    let d4 = rd.next_long();
    let d5 = rd.next_long();
    log::warn!(
        "unknown command {:#06x}: d3 {d3:#010x} d4 {d4:#010x} d5 {d5:#010x}",
        frame.command_id
    );
    rd.skip_long();
    dump_payload(&rd.rest_bytes());
}

fn dump_payload(bytes: &[u8]) {
    for (i, chunk) in bytes.chunks(8).take(32).enumerate() {
        let hex: String = chunk.iter().map(|b| format!("{b:02x} ")).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if (0x20..=0x7E).contains(&b) { b as char } else { '.' })
            .collect();
        log::debug!("{:04x} - {hex}| {ascii}", i * 8);
    }
}
