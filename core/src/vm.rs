use crate::{
    audio::{MixerRef, MusicPlayerRef},
    command::{Command, ResetType, DEFAULT_ZOOM},
    parts::GAME_PART7,
    resource::ResourceRef,
    serializer::Serializer,
    slice_reader::SliceReader,
    staticres::VM_VARIABLE_SCROLL_Y,
    system::SystemRef,
    video::{Point, Segment, VideoRef},
    vm_context::*,
};
use anyhow::{bail, Result};
use std::fmt;

pub use crate::vm_context::{ThreadData, VM_NUM_THREADS, VM_NUM_VARIABLES};

const VM_STACK_SIZE: usize = 0x100;
const COLOR_BLACK: u8 = 0xFF;

// Address right after the gun opcode in part 7 that never stops its sound.
const GUN_SOUND_HACK_ADDR: usize = 0x6D48;

/// Bytecode interpreter: 64 cooperative channels over one shared variable
/// file, run once per frame in channel order.
pub struct VirtualMachine {
    ctx: VmContext,

    stack: [u16; VM_STACK_SIZE],
    stack_ptr: u8,
    pc: usize,
    goto_next_thread: bool,
}

impl VirtualMachine {
    pub fn new(
        sys: SystemRef,
        res: ResourceRef,
        video: VideoRef,
        mixer: MixerRef,
        player: MusicPlayerRef,
    ) -> Self {
        Self {
            ctx: VmContext::new(sys, res, video, mixer, player),
            stack: [0; VM_STACK_SIZE],
            stack_ptr: 0,
            pc: 0,
            goto_next_thread: false,
        }
    }

    pub fn init(&mut self) {
        self.ctx.init();
        self.ctx.fast_mode = false;
    }

    pub fn init_for_part(&mut self, part_id: u16) -> Result<()> {
        log::info!(target: "awvm::vm", "VirtualMachine::init_for_part(0x{:04X})", part_id);
        self.ctx.init_for_part(part_id)
    }

    pub fn fast_mode(&self) -> bool {
        self.ctx.fast_mode
    }

    pub fn toggle_fast_mode(&mut self) {
        self.ctx.toggle_fast_mode();
    }

    pub fn variables(&self) -> &[i16] {
        &self.ctx.variables
    }

    pub fn threads(&self) -> &[ThreadData] {
        &self.ctx.threads_data
    }

    /*
         This is called every frame before the channels run.
    */
    pub fn check_thread_requests(&mut self) -> Result<()> {
        // Check if a part switch has been requested.
        let requested_next_part = self.ctx.res.get_mut().requested_next_part.take();
        if let Some(part_id) = requested_next_part {
            self.init_for_part(part_id)?;
        }

        for (thread_id, thread) in self.ctx.threads_data.iter_mut().enumerate() {
            thread.paused = thread.requested_paused;

            let n = thread.requested_pc_offset;
            if n != VM_NO_SETVEC_REQUESTED {
                log::trace!(target: "awvm::vm", "VirtualMachine::check_thread_requests() thr_id={} n=0x{:04X}", thread_id, n);
                thread.pc_offset = if n == VM_DELETE_THREAD {
                    VM_INACTIVE_THREAD
                } else {
                    n
                };
                thread.requested_pc_offset = VM_NO_SETVEC_REQUESTED;
            }
        }

        self.ctx.poll_music_mark();

        Ok(())
    }

    /// Runs every live channel until it yields (one VM frame).
    pub fn host_frame(&mut self) -> Result<()> {
        for thread_id in 0..VM_NUM_THREADS {
            let thread = self.ctx.threads_data[thread_id];
            if thread.paused || thread.pc_offset == VM_INACTIVE_THREAD {
                continue;
            }

            self.pc = thread.pc_offset as usize;
            self.stack_ptr = 0;
            self.goto_next_thread = false;

            log::trace!(target: "awvm::vm", "VirtualMachine::host_frame() thr_id={} pc=0x{:04X}", thread_id, self.pc);
            self.execute_thread()?;

            self.ctx.threads_data[thread_id].pc_offset = self.pc as u16;

            if self.ctx.sys.get().input().quit {
                break;
            }
        }

        Ok(())
    }

    fn execute_thread(&mut self) -> Result<()> {
        while !self.goto_next_thread {
            let addr = self.pc;
            let cmd = {
                let res = self.ctx.res.get();
                let mut reader = SliceReader::new(res.bytecode()?, addr);
                let opcode = reader.read_u8()?;
                let cmd = Command::parse(opcode, &mut reader)?;
                self.pc = reader.pos();
                cmd
            };

            log::trace!(target: "awvm::vm", "{:04X}: {:?}", addr, cmd);
            self.exec(addr, cmd)?;
        }

        Ok(())
    }

    fn exec(&mut self, addr: usize, cmd: Command) -> Result<()> {
        let ctx = &mut self.ctx;

        match cmd {
            Command::MovConst { var_id, val } => ctx.variables[var_id.idx()] = val,
            Command::Mov { dst_id, src_id } => {
                ctx.variables[dst_id.idx()] = ctx.variables[src_id.idx()];
            }
            Command::Add { dst_id, src_id } => {
                ctx.variables[dst_id.idx()] =
                    ctx.variables[dst_id.idx()].wrapping_add(ctx.variables[src_id.idx()]);
            }
            Command::AddConst { var_id, val } => {
                if ctx.res.get().current_part() == GAME_PART7 && addr + 1 == GUN_SOUND_HACK_ADDR {
                    // The gun script never plays its stopping sound; do it
                    // the way the other scripts do.
                    log::warn!(target: "awvm::vm", "VirtualMachine::op_add_const() hack for non-stop looping gun sound bug");
                    ctx.play_sound(0x5B, 1, 64, 1)?;
                }
                ctx.variables[var_id.idx()] = ctx.variables[var_id.idx()].wrapping_add(val);
            }
            Command::Call { offset } => {
                self.stack[self.stack_ptr as usize] = self.pc as u16;
                if self.stack_ptr == 0xFF {
                    bail!("VirtualMachine::op_call() ec=0x{:X} stack overflow", 0x8F);
                }
                self.stack_ptr += 1;
                self.pc = offset as usize;
            }
            Command::Ret => {
                if self.stack_ptr == 0 {
                    bail!("VirtualMachine::op_ret() ec=0x{:X} stack underflow", 0x8F);
                }
                self.stack_ptr -= 1;
                self.pc = self.stack[self.stack_ptr as usize] as usize;
            }
            Command::PauseThread => self.goto_next_thread = true,
            Command::Jmp { offset } => self.pc = offset as usize,
            Command::SetVect { thr_id, offset } => {
                match ctx.threads_data.get_mut(thr_id as usize) {
                    Some(thread) => thread.requested_pc_offset = offset,
                    None => {
                        log::warn!(target: "awvm::vm", "VirtualMachine::op_set_vect() ignoring invalid channel 0x{:02X}", thr_id)
                    }
                }
            }
            Command::Jnz { var_id, offset } => {
                ctx.variables[var_id.idx()] = ctx.variables[var_id.idx()].wrapping_sub(1);
                if ctx.variables[var_id.idx()] != 0 {
                    self.pc = offset as usize;
                }
            }
            Command::CondJmp {
                jmp_type,
                var_id,
                op2,
                offset,
            } => {
                let a = ctx.variables[var_id.idx()];
                let b = op2.value(&ctx.variables);
                let cond = jmp_type.test(a, b).unwrap_or_else(|| {
                    log::warn!(target: "awvm::vm", "VirtualMachine::op_cond_jmp() bad condition {:?}", jmp_type);
                    false
                });
                if cond {
                    self.pc = offset as usize;
                }
            }
            Command::SetPalette { pal_id } => ctx.video.get_mut().request_palette((pal_id >> 8) as u8),
            Command::ResetThread {
                first,
                last,
                reset_type,
            } => {
                let range = first as usize..=last as usize;
                match reset_type {
                    None => {
                        log::warn!(target: "awvm::vm", "VirtualMachine::op_reset_thread() ec=0x{:X} (last < first)", 0x880);
                    }
                    Some(ResetType::Delete) => ctx.threads_data[range]
                        .iter_mut()
                        .for_each(|t| t.requested_pc_offset = VM_DELETE_THREAD),
                    Some(ResetType::Freeze) => ctx.threads_data[range]
                        .iter_mut()
                        .for_each(|t| t.requested_paused = true),
                    Some(ResetType::Unfreeze) => ctx.threads_data[range]
                        .iter_mut()
                        .for_each(|t| t.requested_paused = false),
                    Some(ResetType::Unknown(code)) => {
                        log::debug!(target: "awvm::vm", "VirtualMachine::op_reset_thread() ignoring type {}", code);
                    }
                }
            }
            Command::SelectVideoPage { page_id } => ctx.video.get_mut().select_page(page_id),
            Command::FillVideoPage { page_id, color } => ctx.video.get_mut().fill_page(page_id, color),
            Command::CopyVideoPage {
                src_page_id,
                dst_page_id,
            } => {
                let vscroll = ctx.variables[VM_VARIABLE_SCROLL_Y];
                ctx.video.get_mut().copy_page(src_page_id, dst_page_id, vscroll);
            }
            Command::BlitFramebuffer { page_id } => ctx.blit_framebuffer(page_id),
            Command::KillThread => {
                self.pc = VM_INACTIVE_THREAD as usize;
                self.goto_next_thread = true;
            }
            Command::DrawString {
                str_id,
                x,
                y,
                color,
            } => ctx.video.get_mut().draw_string(color, x as u16, y as u16, str_id),
            Command::Sub { dst_id, src_id } => {
                ctx.variables[dst_id.idx()] =
                    ctx.variables[dst_id.idx()].wrapping_sub(ctx.variables[src_id.idx()]);
            }
            Command::And { var_id, val } => {
                ctx.variables[var_id.idx()] = (ctx.variables[var_id.idx()] as u16 & val) as i16;
            }
            Command::Or { var_id, val } => {
                ctx.variables[var_id.idx()] = (ctx.variables[var_id.idx()] as u16 | val) as i16;
            }
            Command::Shl { var_id, val } => {
                let v = ctx.variables[var_id.idx()] as u16 as u32;
                ctx.variables[var_id.idx()] = v.checked_shl(val as u32).unwrap_or(0) as u16 as i16;
            }
            Command::Shr { var_id, val } => {
                let v = ctx.variables[var_id.idx()] as u16 as u32;
                ctx.variables[var_id.idx()] = v.checked_shr(val as u32).unwrap_or(0) as u16 as i16;
            }
            Command::PlaySound {
                res_id,
                freq,
                vol,
                channel,
            } => ctx.play_sound(res_id, freq, vol, channel)?,
            Command::UpdateMemList { res_id } => ctx.update_mem_list(res_id)?,
            Command::PlayMusic { res_id, delay, pos } => ctx.play_music(res_id, delay, pos)?,
            Command::Video1 { offset, x, y } => {
                ctx.res.get_mut().set_use_seg_video2(false);
                let mut video = ctx.video.get_mut();
                video.set_active_buffer(Segment::Cinematic, offset as usize);
                video.draw_polygon_at(COLOR_BLACK, DEFAULT_ZOOM, Point::new(x, y));
            }
            Command::Video2 {
                offset,
                x,
                y,
                zoom,
                video2,
            } => {
                let pt = Point::new(x.value(&ctx.variables), y.value(&ctx.variables));
                let zoom = zoom.value(&ctx.variables) as u16;
                let segment = if video2 {
                    Segment::Video2
                } else {
                    Segment::Cinematic
                };

                ctx.res.get_mut().set_use_seg_video2(video2);
                let mut video = ctx.video.get_mut();
                video.set_active_buffer(segment, offset as usize);
                video.draw_polygon_at(COLOR_BLACK, zoom, pt);
            }
        }

        Ok(())
    }

    pub fn inp_update_player(&mut self) {
        self.ctx.inp_update_player();
    }

    pub fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()> {
        self.ctx.save_or_load(ser, &mut self.stack)
    }
}

impl fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("ctx", &self.ctx)
            .field("stack_ptr", &self.stack_ptr)
            .field("pc", &format_args!("0x{:04X}", self.pc))
            .finish()
    }
}
