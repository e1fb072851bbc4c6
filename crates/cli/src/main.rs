//! Operator CLI for the IPD workflow service.
//!
//! Works directly against the state snapshot in `IPD_DATA_DIR`, so it is
//! meant for seeding, inspection and back-office corrections on a stopped or
//! single-operator deployment, not for concurrent use next to a running
//! server instance.

use clap::{Parser, Subcommand};
use ipd_core::actor::{Actor, Role};
use ipd_core::admission::AdmissionService;
use ipd_core::config::hospital_code_from_env_value;
use ipd_core::constants::DEFAULT_DATA_DIR;
use ipd_core::directory::{Directory, WardType};
use ipd_core::ledger::BedLedger;
use ipd_core::priority::PriorityEngine;
use ipd_core::reservation::ReservationManager;
use ipd_core::transfer::TransferService;
use ipd_core::{CoreConfig, Store};
use ipd_types::NonEmptyText;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ipd")]
#[command(about = "IPD in-patient workflow CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the default priority rule and consideration tables
    Seed,
    /// Show the configured priority rules
    Rules,
    /// Register a bed
    RegisterBed {
        /// Acting admin's id (UUID)
        actor_id: String,
        /// Bed code, e.g. ICU-03
        code: String,
        /// Ward type, e.g. icu
        ward_type: String,
    },
    /// Register a patient reference
    RegisterPatient {
        /// Acting admin's id (UUID)
        actor_id: String,
        /// Unique hospital identifier
        uhid: String,
        /// Patient name
        name: String,
    },
    /// List registered beds
    Beds,
    /// List admissions, newest first
    Admissions,
    /// Create an admission for a patient
    Admit {
        /// Acting doctor's id (UUID)
        actor_id: String,
        /// Patient id (UUID)
        patient_id: String,
    },
    /// Show the statuses reachable from an admission's current status
    AllowedTransitions {
        /// Admission id (UUID)
        admission_id: String,
    },
    /// List emergency transfers still awaiting their justification
    PendingJustifications,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir =
        PathBuf::from(std::env::var("IPD_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into()));
    let hospital_code = hospital_code_from_env_value(std::env::var("IPD_HOSPITAL_CODE").ok());
    let cfg = CoreConfig::new(data_dir, hospital_code)?;
    let store = Arc::new(Store::load(cfg.data_dir())?);

    match cli.command {
        None => {
            println!("ipd workflow CLI for {} -- try --help", cfg.hospital_code());
        }
        Some(Commands::Seed) => {
            let engine = PriorityEngine::new(store.clone());
            engine.seed_defaults();
            store.persist(cfg.data_dir())?;
            println!("installed {} priority rules", engine.rules().len());
        }
        Some(Commands::Rules) => {
            let engine = PriorityEngine::new(store.clone());
            for rule in engine.rules() {
                let state = if rule.active { "active" } else { "inactive" };
                println!("{:<22} -> {} ({state})", rule.condition.to_string(), rule.tier);
            }
            for row in engine.considerations() {
                let state = if row.active { "active" } else { "inactive" };
                println!("{:<22} boost +{} ({state})", row.consideration.to_string(), row.boost);
            }
        }
        Some(Commands::RegisterBed {
            actor_id,
            code,
            ward_type,
        }) => {
            let actor = Actor::new(actor_id.parse::<Uuid>()?, Role::Admin);
            let ward_type: WardType = ward_type.parse()?;
            let bed = Directory::new(store.clone()).register_bed(
                &actor,
                NonEmptyText::new(&code)?,
                ward_type,
            )?;
            store.persist(cfg.data_dir())?;
            println!("registered bed {} ({})", bed.code, bed.id);
        }
        Some(Commands::RegisterPatient {
            actor_id,
            uhid,
            name,
        }) => {
            let actor = Actor::new(actor_id.parse::<Uuid>()?, Role::Admin);
            let patient = Directory::new(store.clone()).register_patient(
                &actor,
                NonEmptyText::new(&uhid)?,
                NonEmptyText::new(&name)?,
            )?;
            store.persist(cfg.data_dir())?;
            println!("registered patient {} ({})", patient.uhid, patient.id);
        }
        Some(Commands::Beds) => {
            let ledger = BedLedger::new(store.clone());
            let reservations = ReservationManager::new(store.clone());
            for bed in Directory::new(store.clone()).list_beds() {
                let occupancy = match ledger.active_allocation_for_bed(bed.id) {
                    Some(allocation) => format!("occupied by {}", allocation.admission_id),
                    None => "free".into(),
                };
                let hold = match reservations.active_reservation_for_bed(bed.id) {
                    Some(reservation) => format!(", {} hold", reservation.status),
                    None => String::new(),
                };
                println!(
                    "{:<10} {:<10} {} ({occupancy}{hold})",
                    bed.code.to_string(),
                    bed.ward_type.to_string(),
                    bed.id
                );
            }
        }
        Some(Commands::Admissions) => {
            for admission in AdmissionService::new(store.clone()).list() {
                let priority = admission
                    .priority
                    .map(|tier| tier.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<16} {:<20} {:<4} {}",
                    admission.admission_no.to_string(),
                    admission.status.to_string(),
                    priority,
                    admission.id
                );
            }
        }
        Some(Commands::Admit {
            actor_id,
            patient_id,
        }) => {
            let actor = Actor::new(actor_id.parse::<Uuid>()?, Role::Doctor);
            let admission =
                AdmissionService::new(store.clone()).create(&actor, patient_id.parse::<Uuid>()?)?;
            store.persist(cfg.data_dir())?;
            println!(
                "created admission {} ({})",
                admission.admission_no, admission.id
            );
        }
        Some(Commands::AllowedTransitions { admission_id }) => {
            let targets = AdmissionService::new(store.clone())
                .allowed_targets(admission_id.parse::<Uuid>()?)?;
            if targets.is_empty() {
                println!("(terminal status; no outgoing transitions)");
            } else {
                for target in targets {
                    println!("{target}");
                }
            }
        }
        Some(Commands::PendingJustifications) => {
            for row in TransferService::new(store.clone()).pending_justification() {
                println!(
                    "{} admission={} target={} recommended={}",
                    row.id,
                    row.admission_id,
                    row.target_ward,
                    row.recommended_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}
