//! Add / update / get / delete steps against the place API.

use crate::api_client::{ApiClient, ApiResponse};
use crate::error::StepError;
use crate::fixture::FixtureProvider;
use crate::model::{HttpMethod, StepDescriptor};
use crate::runner::{StepContext, StepExecutor};
use crate::validator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

pub const ADD_PLACE: &str = "add_place";
pub const UPDATE_PLACE: &str = "update_place";
pub const GET_PLACE: &str = "get_place";
pub const DELETE_PLACE: &str = "delete_place";

/// Shared state key for the identifier returned by the add step.
pub const PLACE_ID: &str = "place_id";
/// Shared state key for the address written by the update step.
pub const ADDRESS: &str = "address";

/// The CRUD chain, in execution order.
pub const PLACE_CRUD: [StepDescriptor; 4] = [
    StepDescriptor {
        name: ADD_PLACE,
        title: "Add Place",
        description: "Adding a new place using POST request",
        predecessor: None,
        requires: &[],
    },
    StepDescriptor {
        name: UPDATE_PLACE,
        title: "Update Place",
        description: "Updating the place with new address using PUT request",
        predecessor: Some(ADD_PLACE),
        requires: &[PLACE_ID],
    },
    StepDescriptor {
        name: GET_PLACE,
        title: "Get Place",
        description: "Retrieving the updated place using GET request",
        predecessor: Some(UPDATE_PLACE),
        requires: &[PLACE_ID, ADDRESS],
    },
    StepDescriptor {
        name: DELETE_PLACE,
        title: "Delete Place",
        description: "Deleting the place using DELETE request",
        predecessor: Some(GET_PLACE),
        requires: &[PLACE_ID],
    },
];

/// Resource paths, relative to [`RequestSpec::base_path`](crate::RequestSpec).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceResources {
    pub add: String,
    pub get: String,
    pub update: String,
    pub delete: String,
}

impl Default for PlaceResources {
    fn default() -> Self {
        Self {
            add: "/add/json".to_string(),
            get: "/get/json".to_string(),
            update: "/update/json".to_string(),
            delete: "/delete/json".to_string(),
        }
    }
}

/// Inputs of the CRUD chain that are not part of the request spec.
#[derive(Debug, Clone)]
pub struct PlaceSettings {
    pub api_key: String,
    pub new_address: String,
    pub resources: PlaceResources,
    /// Headers the add response must carry, e.g. `Server`.
    pub expected_headers: HashMap<String, String>,
}

impl Default for PlaceSettings {
    fn default() -> Self {
        Self {
            api_key: "qaclick123".to_string(),
            new_address: "Galaxy Apartments, Pune".to_string(),
            resources: PlaceResources::default(),
            expected_headers: HashMap::new(),
        }
    }
}

/// Executes the [`PLACE_CRUD`] steps.
#[derive(Debug)]
pub struct PlaceSteps {
    client: ApiClient,
    fixtures: FixtureProvider,
    settings: PlaceSettings,
}

impl PlaceSteps {
    pub fn new(client: ApiClient, fixtures: FixtureProvider, settings: PlaceSettings) -> Self {
        Self {
            client,
            fixtures,
            settings,
        }
    }

    /// Render a fixture and make sure the result is JSON.
    fn payload(&self, name: &str, values: &HashMap<&str, &str>) -> Result<String, StepError> {
        let payload = self.fixtures.render(name, values)?;
        serde_json::from_str::<serde_json::Value>(&payload).map_err(|e| {
            StepError::MalformedFixture {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(payload)
    }

    async fn call(
        &self,
        ctx: &mut StepContext<'_>,
        method: HttpMethod,
        resource: &str,
        body: Option<&str>,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse, StepError> {
        let url = self.client.url_for(resource, query)?;
        ctx.attach_text("Full URL", url.as_str());
        let endpoint = self.client.spec().endpoint(resource);
        ctx.log(format!("Sending {method} request to {endpoint}"));

        let response = self.client.send(method, resource, body, query).await?;
        if let Ok(request) = serde_json::to_string_pretty(&response.request) {
            ctx.attach_json("Request", &request);
        }
        if !response.is_success() {
            warn!("{} {} returned status {}", method, url, response.status);
        }
        ctx.log(format!("Response received: {}", response.body));
        ctx.attach("API Response", response.body.as_bytes(), "application/json");
        Ok(response)
    }

    async fn add_place(&self, ctx: &mut StepContext<'_>) -> Result<String, StepError> {
        let values = HashMap::from([("apiKey", self.settings.api_key.as_str())]);
        let payload = self.payload(ADD_PLACE, &values)?;
        ctx.attach_json("Request Payload", &payload);

        let resource = &self.settings.resources.add;
        let response = self
            .call(ctx, HttpMethod::Post, resource, Some(payload.as_str()), &[])
            .await?;
        response.expect_status(200)?;
        validator::validate_headers(&response.headers, &self.settings.expected_headers)?;
        ctx.log("Validated status code 200 and response headers");

        match response.string_at(PLACE_ID) {
            Some(place_id) => {
                ctx.state.set(PLACE_ID, place_id.as_str())?;
                ctx.log(format!("Got the Place ID: {place_id}"));
                ctx.attach_text("Place ID", &place_id);
                Ok(format!("Place added successfully with Place ID: {place_id}"))
            }
            None => {
                warn!("Add response carried no place_id: {}", response.body);
                ctx.log("Response carried no place_id");
                Ok("Place added, but the response carried no place_id".to_string())
            }
        }
    }

    async fn update_place(&self, ctx: &mut StepContext<'_>) -> Result<String, StepError> {
        let place_id = ctx.state.require(PLACE_ID)?.to_string();
        let new_address = self.settings.new_address.as_str();
        ctx.log(format!("Updating the address to: {new_address}"));

        let values = HashMap::from([
            ("placeId", place_id.as_str()),
            ("newAddress", new_address),
            ("apiKey", self.settings.api_key.as_str()),
        ]);
        let payload = self.payload(UPDATE_PLACE, &values)?;
        ctx.attach_json("Update Request Payload", &payload);

        let resource = &self.settings.resources.update;
        let response = self
            .call(ctx, HttpMethod::Put, resource, Some(payload.as_str()), &[])
            .await?;
        response.expect_status(200)?;
        let msg = validator::expect_field(
            response.require_json()?,
            "msg",
            "Address successfully updated",
        )?;
        ctx.attach_text("Update Message", &msg);
        ctx.state.set(ADDRESS, new_address)?;

        Ok(format!("Address successfully updated to: {new_address}"))
    }

    async fn get_place(&self, ctx: &mut StepContext<'_>) -> Result<String, StepError> {
        let place_id = ctx.state.require(PLACE_ID)?.to_string();
        let expected = ctx.state.require(ADDRESS)?.to_string();

        let response = self
            .call(
                ctx,
                HttpMethod::Get,
                &self.settings.resources.get,
                None,
                &[(PLACE_ID, place_id.as_str())],
            )
            .await?;
        response.expect_status(200)?;
        let body = response.require_json()?;
        let address = validator::expect_field(body, "address", &expected)?;
        ctx.log(format!("Address we got back: {address}"));
        ctx.attach_text("Retrieved Address", &address);

        Ok(format!("Successfully retrieved and validated updated address: {address}"))
    }

    async fn delete_place(&self, ctx: &mut StepContext<'_>) -> Result<String, StepError> {
        let place_id = ctx.state.require(PLACE_ID)?.to_string();
        let values = HashMap::from([("placeId", place_id.as_str())]);
        let payload = self.payload(DELETE_PLACE, &values)?;
        ctx.attach_json("Delete Request Payload", &payload);

        let resource = &self.settings.resources.delete;
        let response = self
            .call(ctx, HttpMethod::Delete, resource, Some(payload.as_str()), &[])
            .await?;
        response.expect_status(200)?;
        let status = validator::expect_field(response.require_json()?, "status", "OK")?;
        ctx.attach_text("Delete Status", &status);

        Ok(format!("Place deleted successfully with Place ID: {place_id}"))
    }
}

#[async_trait]
impl StepExecutor for PlaceSteps {
    async fn execute(
        &self,
        step: &StepDescriptor,
        ctx: &mut StepContext<'_>,
    ) -> Result<String, StepError> {
        match step.name {
            ADD_PLACE => self.add_place(ctx).await,
            UPDATE_PLACE => self.update_place(ctx).await,
            GET_PLACE => self.get_place(ctx).await,
            DELETE_PLACE => self.delete_place(ctx).await,
            other => Err(StepError::UnknownStep(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::RequestSpec;
    use crate::error::ErrorKind;
    use crate::report::DashboardReporter;
    use crate::runner::{validate_sequence, SequenceState};

    #[test]
    fn test_place_crud_is_a_valid_chain() {
        assert!(validate_sequence(&PLACE_CRUD).is_ok());
        let names: Vec<&str> = PLACE_CRUD.iter().map(|s| s.name).collect();
        assert_eq!(names, vec![ADD_PLACE, UPDATE_PLACE, GET_PLACE, DELETE_PLACE]);
    }

    fn steps(fixtures: FixtureProvider) -> PlaceSteps {
        let client = ApiClient::new(RequestSpec::new("http://127.0.0.1:9")).unwrap();
        PlaceSteps::new(client, fixtures, PlaceSettings::default())
    }

    #[test]
    fn test_payload_rejects_malformed_json() {
        let fixtures = FixtureProvider::in_memory()
            .with_inline(DELETE_PLACE, "{\"place_id\": ${placeId}");
        let steps = steps(fixtures);
        let values = HashMap::from([("placeId", "abc")]);
        let err = steps.payload(DELETE_PLACE, &values).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFixture);
    }

    #[tokio::test]
    async fn test_missing_fixture_fails_before_any_request() {
        let steps = steps(FixtureProvider::in_memory());
        let mut state = SequenceState::new();
        let mut reporter = DashboardReporter::new(std::env::temp_dir(), "unused");
        let mut ctx = StepContext::new(&mut state, &mut reporter);

        let err = steps.execute(&PLACE_CRUD[0], &mut ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FixtureNotFound);
    }

    #[tokio::test]
    async fn test_unknown_step_is_rejected() {
        let steps = steps(FixtureProvider::in_memory());
        let mut state = SequenceState::new();
        let mut reporter = DashboardReporter::new(std::env::temp_dir(), "unused");
        let mut ctx = StepContext::new(&mut state, &mut reporter);
        let step = StepDescriptor {
            name: "patch_place",
            title: "Patch Place",
            description: "",
            predecessor: None,
            requires: &[],
        };

        let err = steps.execute(&step, &mut ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownStep);
    }
}
