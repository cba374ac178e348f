use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use advance_reservation::api::reservation_dto::{ReservationActionDto, ReservationRequestDto};
use advance_reservation::domain::controller::Controller;
use advance_reservation::domain::persistence::recovery::RecoverMode;
use advance_reservation::domain::persistence::state_codec::decode_show_buffer;
use advance_reservation::domain::reservation::reservation::format_time;
use advance_reservation::domain::reservation::reservation_flags::ReservationFlags;
use advance_reservation::domain::reservation::reservation_request::{CreateReservationRequest, UpdateReservationRequest};
use advance_reservation::domain::simulator::simulator::Simulator;
use advance_reservation::loader::parser::load_reservation_requests;
use advance_reservation::{generate_controller, logger};

/// Reservation controller: applies administrative reservation requests to a
/// cluster and keeps the reservation state on disk.
#[derive(Debug, Parser)]
#[command(name = "resv_ctld", version)]
struct Args {
    /// Cluster description (JSON).
    #[arg(long)]
    cluster: String,

    /// Reservation requests to apply in order (JSON array).
    #[arg(long)]
    requests: Option<String>,

    /// Load the saved reservation state before applying requests.
    #[arg(long)]
    recover: bool,

    /// Print every reservation at the end.
    #[arg(long)]
    show: bool,
}

fn apply_request(controller: &Controller, request: &ReservationRequestDto) {
    let label = request.name.as_deref().unwrap_or("<generated>");
    let result = match request.action {
        ReservationActionDto::Create => controller.create_resv(&CreateReservationRequest::from(request)).map(|name| log::info!("Reservation {} created", name)),
        ReservationActionDto::Update => controller.update_resv(&UpdateReservationRequest::from(request)),
        ReservationActionDto::Delete => controller.delete_resv(label),
    };
    if let Err(e) = result {
        log::error!("{:?} of reservation {} failed (code {}): {}", request.action, label, e.code().as_u32(), e);
    }
}

fn print_reservations(controller: &Controller) -> anyhow::Result<()> {
    let buffer = controller.show_resv()?;
    let show = decode_show_buffer(&buffer)?;

    println!("Reservations at {} ({}):", format_time(show.snapshot_time), show.reservations.len());
    for info in &show.reservations {
        println!(
            "  ReservationName={} StartTime={} EndTime={} Nodes={} NodeCnt={} Partition={} Features={} Flags={} Users={} Accounts={}",
            info.name,
            format_time(info.start_time),
            format_time(info.end_time),
            info.node_list.as_deref().unwrap_or("(null)"),
            info.node_count,
            info.partition.as_deref().unwrap_or("(null)"),
            info.features.as_deref().unwrap_or("(null)"),
            ReservationFlags::from_bits(info.flags),
            info.users.as_deref().unwrap_or("(null)"),
            info.accounts.as_deref().unwrap_or("(null)")
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init();

    let controller = generate_controller(&args.cluster, Arc::new(Simulator::real_time())).with_context(|| format!("building controller from '{}'", args.cluster))?;

    let mode = if args.recover { RecoverMode::Recover } else { RecoverMode::Validate };
    match controller.load_state(mode) {
        Ok(count) => log::info!("{} reservations active after startup", count),
        Err(e) => log::error!("Reservation state recovery failed, continuing with {} reservations: {}", controller.read().resv.len(), e),
    }

    if let Some(path) = &args.requests {
        let requests = load_reservation_requests(path).with_context(|| format!("loading requests from '{}'", path))?;
        for request in &requests {
            apply_request(&controller, request);
        }
    }

    let failed = controller.run_job_resv_check();
    if !failed.is_empty() {
        log::warn!("Jobs failing reservation check: {:?}", failed);
    }

    controller.flush_state();

    if args.show {
        print_reservations(&controller)?;
    }
    Ok(())
}
