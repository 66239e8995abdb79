//! # smartpix_sim
//!
//! smartpix_sim drives the smart pixel simulation chain, written in Rust. It sweeps the Pythia
//! minimum bias generator over a range of pTHat bins and, for every bin, runs a chain of
//! external programs:
//!
//! 1. `minbias.exe` (Pythia) generates events into HepMC
//! 2. Delphes simulates the detector response, writing a ROOT file
//! 3. `smartpix_tracklist` converts the Delphes tracks into a PixelAV track list
//! 4. PixelAV simulates the response of the silicon pixel sensor
//!
//! The physics programs themselves are not part of this repository; they are invoked by path.
//!
//! ## Building & Install
//!
//! To build and install the launcher use `cargo install --path ./smartpix_launch` from the top
//! level repository. The track list converter is installed with
//! `cargo install --path ./smartpix_tracklist`. The launcher expects `smartpix_tracklist` to be
//! on your path unless `tracklist_exe` is set in the configuration.
//!
//! ## Launching
//!
//! Jobs can run locally on a pool of worker threads or be submitted to SLURM:
//!
//! ```bash
//! smartpix_launch -o ./output -j 8 -n 1000 -p ./pixelav/
//! smartpix_launch -o ./output --mode slurm --query ./query.json --njobs 2
//! ```
//!
//! In SLURM mode the query file is a YAML or JSON mapping of submission parameters, using the
//! same names as submitit (`slurm_partition`, `timeout_min`, `mem_gb`, `cpus_per_task`, ...).
//! Every launch writes its jobs, batch scripts, and SLURM logs to a fresh
//! `results/temp-<8 hex chars>/` directory.
//!
//! ## Configuration
//!
//! The stage executables and the active chain are set with a YAML configuration, for which a
//! template can be made with `smartpix_launch new -c config.yml`. The format is:
//!
//! ```yml
//! out_dir: ./
//! n_cpu: 4
//! max_events: 1000
//! scan_start: 0.0
//! scan_stop: 2.0
//! scan_points: 21
//! stages:
//! - generator
//! - detector_response
//! - track_list
//! - sensor_simulation
//! generator_exe: ./bin/minbias.exe
//! delphes_exe: /opt/delphes/DelphesHepMC3
//! delphes_card: ./delphes_card_CMS_ABEdit.tcl
//! tracklist_exe: smartpix_tracklist
//! float_precision: 5
//! pixelav_dir: ./pixelav/
//! pixelav_exe: ./bin/ppixelav2_list_trkpy_n_2f.exe
//! mode: local
//! query_path: null
//! results_dir: results
//! n_jobs: -1
//! ```
//!
//! Command line flags override the values in the file. A `placeholder` stage (`echo hi`) is
//! available for checking the launch machinery without running any physics.
//!
//! ## Track lists
//!
//! PixelAV reads a plain text track list, one track per line:
//!
//! ```text
//! cota cotb p flp localx localy pT
//! ```
//!
//! `flp` is always written as an integer, every other field as a fixed precision decimal.
//! `smartpix_tracklist delphes` builds the list from the charged pions of a Delphes ROOT
//! file; `smartpix_tracklist hepmc` builds it from the final state particles of a HepMC file
//! that were produced within the pixel detector (30 mm to 130 mm from the beam).
pub mod batch;
pub mod command;
pub mod config;
pub mod delphes;
pub mod error;
pub mod extract;
pub mod hepmc;
pub mod job;
pub mod launch;
pub mod pool;
pub mod runner;
pub mod scan;
pub mod track;
pub mod worker_status;
