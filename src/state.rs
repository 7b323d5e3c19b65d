use std::sync::Arc;
use crate::domain::ports::{
    AuditRepository, FacilityRepository, OpenPlayRepository, PackageRepository,
    PolicyRepository, ReservationRepository, WaitlistRepository,
};
use crate::domain::services::{
    availability::AvailabilityEngine,
    cancellation_policy::CancellationPolicyResolver,
    clock::Clock,
    open_play_service::OpenPlayService,
    redemption_ledger::RedemptionLedger,
    reservation_service::ReservationService,
    waitlist_service::WaitlistService,
};
use crate::config::Config;

/// One storage backend's repositories.
#[derive(Clone)]
pub struct Repositories {
    pub facility_repo: Arc<dyn FacilityRepository>,
    pub reservation_repo: Arc<dyn ReservationRepository>,
    pub policy_repo: Arc<dyn PolicyRepository>,
    pub open_play_repo: Arc<dyn OpenPlayRepository>,
    pub waitlist_repo: Arc<dyn WaitlistRepository>,
    pub package_repo: Arc<dyn PackageRepository>,
    pub audit_repo: Arc<dyn AuditRepository>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub facility_repo: Arc<dyn FacilityRepository>,
    pub audit_repo: Arc<dyn AuditRepository>,
    pub availability: Arc<AvailabilityEngine>,
    pub policy: Arc<CancellationPolicyResolver>,
    pub ledger: Arc<RedemptionLedger>,
    pub waitlist: Arc<WaitlistService>,
    pub reservations: Arc<ReservationService>,
    pub open_play: Arc<OpenPlayService>,
}

impl AppState {
    /// Wires the services on top of the given repositories. Tests pass a fixed clock here.
    pub fn build(config: Config, repos: Repositories, clock: Arc<dyn Clock>) -> Self {
        let availability = Arc::new(AvailabilityEngine::new(repos.reservation_repo.clone()));
        let policy = Arc::new(CancellationPolicyResolver::new(repos.policy_repo.clone()));
        let ledger = Arc::new(RedemptionLedger::new(repos.package_repo.clone(), clock.clone()));
        let waitlist = Arc::new(WaitlistService::new(
            repos.waitlist_repo.clone(),
            repos.facility_repo.clone(),
            clock.clone(),
            config.sweep_batch_size,
        ));
        let reservations = Arc::new(ReservationService::new(
            repos.facility_repo.clone(),
            repos.reservation_repo.clone(),
            policy.clone(),
            ledger.clone(),
            waitlist.clone(),
            clock.clone(),
        ));
        let open_play = Arc::new(OpenPlayService::new(
            repos.open_play_repo.clone(),
            repos.reservation_repo.clone(),
            repos.facility_repo.clone(),
            waitlist.clone(),
            clock.clone(),
        ));

        Self {
            config,
            clock,
            facility_repo: repos.facility_repo,
            audit_repo: repos.audit_repo,
            availability,
            policy,
            ledger,
            waitlist,
            reservations,
            open_play,
        }
    }
}
