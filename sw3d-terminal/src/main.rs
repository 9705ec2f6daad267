//! SW3D Terminal Demo
//!
//! Spins an STL model (or a cube) in the terminal, optionally in front of a
//! star field. Run with `--help` for options; controls are shown on screen.
use std::fs;
use std::process::ExitCode;

use sw3d_core::{stl, Mesh};
use sw3d_terminal::{AppConfig, AppError, TerminalApp};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), AppError> {
    let config = AppConfig::from_args(std::env::args().skip(1))?;
    if config.show_help {
        println!("{}", sw3d_terminal::config::USAGE);
        return Ok(());
    }

    let mesh = match &config.stl_path {
        Some(path) => {
            let data = fs::read(path).map_err(|source| AppError::Read {
                path: path.clone(),
                source,
            })?;
            let mesh = stl::parse_stl(&data).map_err(|source| AppError::Stl {
                path: path.clone(),
                source,
            })?;
            log::info!(
                "loaded {}: {} triangles, {} vertices",
                path.display(),
                mesh.triangle_count(),
                mesh.vertex_count()
            );
            mesh
        }
        None => Mesh::cube(2.0),
    };

    let mut app = TerminalApp::new(mesh, config)?;
    app.run()
}
