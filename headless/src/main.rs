use anyhow::{Context, Result};
use awvm_core::{
    audio::{MixerRef, MusicPlayerRef},
    engine::Engine,
    memlist::ResType,
    program::Program,
    reference::Ref,
    resource::{ResourceManager, ResourceRef},
    storage::DirStorage,
    system::SystemRef,
    video::VideoRef,
};
use awvm_headless::{
    args::{self, Args, Mode},
    logger,
    mixer::HeadlessMixer,
    music::HeadlessMusic,
    system::HeadlessSystem,
    video::HeadlessVideo,
};

fn disasm(res: &ResourceRef) -> Result<()> {
    res.get_mut().read_directory()?;

    let ids: Vec<u16> = res
        .get()
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, me)| me.res_type == ResType::Bytecode)
        .map(|(id, _)| id as u16)
        .collect();

    for id in ids {
        let code = res.get().read_entry(id)?;
        let mut program = Program::new(id, code);
        program.parse();
        println!("; resource 0x{:02X}: {} instructions", program.id(), program.len());
        print!("{:?}", program);
    }

    Ok(())
}

fn run(args: Args, res: ResourceRef) -> Result<()> {
    let sys: SystemRef = Ref::new(Box::new(HeadlessSystem::new()));
    let video: VideoRef = Ref::new(Box::new(HeadlessVideo::new(res.clone())));
    let mixer = HeadlessMixer::new();
    let mixer_ref: MixerRef = Ref::new(Box::new(mixer.clone()));
    let player: MusicPlayerRef = Ref::new(Box::new(HeadlessMusic::new(res.clone())));

    let mut engine = Engine::new(args.config, sys, res.clone(), video, mixer_ref, player);
    engine.init()?;
    let frames = engine.run(args.frames)?;

    println!(
        "{} frames, part 0x{:04X}, {} active sound channels, save slot {}",
        frames,
        res.get().current_part(),
        mixer.active_channels(),
        engine.state_slot()
    );

    Ok(())
}

fn main() -> Result<()> {
    logger::init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = args::parse_args(&argv, |name| std::env::var(name).ok())?;

    let storage = DirStorage::new(&args.config.data_dir);
    log::info!(target: "awvm::info", "Using {:?}", storage);
    let res = Ref::new(ResourceManager::new(Box::new(storage)));

    match args.mode {
        Mode::PrintHelp => {
            print!("{}", args::USAGE);
            Ok(())
        }
        Mode::Disasm => disasm(&res).context("Unable to list the bytecode"),
        Mode::Run => run(args, res),
    }
}
