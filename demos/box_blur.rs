use hecirc::cfg::clap::{self, Parser};
use hecirc::cfg::{Cfg, HeOpt};
use hecirc::circuits::{box_blur, box_blur_baseline};
use hecirc::error::Error;
use hecirc::ir::term::eval::agree_on_random_inputs;
use hecirc::session::Session;

use log::info;

#[derive(Debug, Parser)]
#[command(name = "box_blur", about = "Compile a 3x3 box blur for homomorphic evaluation")]
struct Options {
    /// Image width; the image is square
    #[arg(long, default_value = "64")]
    width: usize,

    /// Simplify with the external optimizer instead of the rewrite rules
    #[arg(long)]
    eqsat: bool,

    #[command(flatten)]
    he: HeOpt,
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_default_env()
        .format_level(false)
        .format_timestamp(None)
        .init();
    let options = Options::parse();
    let slots = options.width * options.width;
    let mut s = Session::new(Cfg::from(options.he));

    let baseline = s.create_func("box_blur_baseline", slots, 20, false, true)?;
    box_blur_baseline(baseline, options.width)?;
    let f = s.create_func("box_blur", slots, 20, false, true)?;
    box_blur(f, options.width)?;

    let artifacts = if options.eqsat {
        let mut oracle = s.cfg().process_oracle();
        vec![
            s.compile_eqsat("box_blur_baseline", &mut oracle)?,
            s.compile_eqsat("box_blur", &mut oracle)?,
        ]
    } else {
        vec![s.compile("box_blur_baseline")?, s.compile("box_blur")?]
    };
    let agree = agree_on_random_inputs(
        s.get_func("box_blur_baseline")?,
        s.get_func("box_blur")?,
        2,
        0,
    )?;
    info!("Baseline and compiled blur agree: {}", agree);
    for a in &artifacts {
        match serde_json::to_string_pretty(a) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Cannot serialize '{}': {}", a.func, e),
        }
    }
    Ok(())
}
