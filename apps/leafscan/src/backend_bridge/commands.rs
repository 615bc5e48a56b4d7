//! Backend commands queued from the dispatch thread to the backend worker.

use client_core::workflow::{PendingRequest, RequestKind};
use shared::domain::PlantId;

#[derive(Debug)]
pub enum BackendCommand {
    /// Prediction or explanation issued by the workflow controller.
    Workflow(PendingRequest),
    LookupPlant {
        plant_id: PlantId,
    },
    MedicinalProperties {
        plant_id: PlantId,
    },
    SearchPlants {
        query: String,
    },
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Workflow(request) => match request.kind {
                RequestKind::Predict => "predict",
                RequestKind::Explain => "explain",
            },
            Self::LookupPlant { .. } => "lookup_plant",
            Self::MedicinalProperties { .. } => "medicinal_properties",
            Self::SearchPlants { .. } => "search_plants",
        }
    }
}
