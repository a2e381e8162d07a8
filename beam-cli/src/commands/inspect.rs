use std::path::PathBuf;

use arkbeam::{load_manifest, BeamStorage};

use super::EXIT_SUCCESS;
use crate::{AppConfig, AppError};

#[derive(Clone, Debug, clap::Args)]
#[clap(
    name = "inspect",
    about = "Show what a missing parts manifest asks for"
)]
pub struct Inspect {
    #[clap(value_parser, help = "The manifest, defaults to the one in the work dir")]
    manifest: Option<PathBuf>,
    #[clap(long, help = "Where drafts and the manifest live")]
    work_dir: Option<PathBuf>,
}

impl Inspect {
    pub fn run(&self, config: &AppConfig) -> Result<i32, AppError> {
        let storage =
            BeamStorage::new(self.work_dir.clone().unwrap_or_else(|| config.work_dir()));
        let path = self
            .manifest
            .clone()
            .unwrap_or_else(|| storage.manifest_path());
        let manifest = load_manifest(&path)?;

        println!("Manifest: {}", path.display());
        println!("Session:  {}", manifest.session_id);
        println!("File:     {}", manifest.filename());
        println!(
            "Missing:  {}/{} frames ({})",
            manifest.missing.len(),
            manifest.total,
            manifest.ranges()
        );

        match storage.load_draft(manifest.filename()) {
            Ok(Some(draft)) if draft.belongs_to(&manifest.session_id, manifest.total) => {
                println!(
                    "Draft:    {}/{} frames stored in {}",
                    draft.stored(),
                    draft.total(),
                    storage.draft_path(manifest.filename()).display()
                );
            }
            Ok(Some(_)) => println!("Draft:    belongs to another session"),
            Ok(None) => println!("Draft:    none"),
            Err(e) => println!("Draft:    unreadable ({})", e),
        }
        Ok(EXIT_SUCCESS)
    }
}
