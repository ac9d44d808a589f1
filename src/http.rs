//! REST interface.
//!
//! Every endpoint answers with JSON. Requests are routed by [route], which only
//! needs the shared simulator, so the routing table is tested without a socket.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server};
use tokio_util::sync::CancellationToken;

use crate::SimulatorError;
use crate::fdm::state::{
    Accelerations, Atmosphere, Controls, Engine, Gps, Orientation, Position, Velocities,
};
use crate::simulator::command::{CommandRequest, CommandResponse};
use crate::simulator::{Simulator, lock};

/// How often the serving loop checks for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Status code and JSON body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => HttpResponse { status, body },
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                Self::error(500, "internal error")
            }
        }
    }

    fn ok<T: Serialize>(value: &T) -> Self {
        Self::json(200, value)
    }

    fn error(status: u16, message: &str) -> Self {
        HttpResponse {
            status,
            body: serde_json::json!({ "error": message }).to_string(),
        }
    }

    fn not_found() -> Self {
        Self::error(404, "not found")
    }

    fn method_not_allowed() -> Self {
        Self::error(405, "method not allowed")
    }
}

#[derive(Serialize)]
struct AircraftInfo<'a> {
    #[serde(rename = "type")]
    aircraft: &'a str,
}

/// Routes a request to its handler.
///
/// `path` may carry a query string, which is ignored. A trailing slash is
/// accepted on every path.
pub fn route(
    simulator: &Mutex<Simulator>,
    method: &Method,
    path: &str,
    body: &[u8],
    content_type: Option<&str>,
) -> HttpResponse {
    let path = path.split('?').next().unwrap_or_default();
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    if path == "/simulator" {
        return match method {
            Method::Get => HttpResponse::ok(&lock(simulator).status()),
            Method::Post => execute_command(simulator, body, content_type),
            _ => HttpResponse::method_not_allowed(),
        };
    }

    let Some(response) = read_resource(simulator, path) else {
        return HttpResponse::not_found();
    };
    match method {
        Method::Get => response,
        _ => HttpResponse::method_not_allowed(),
    }
}

fn execute_command(
    simulator: &Mutex<Simulator>,
    body: &[u8],
    content_type: Option<&str>,
) -> HttpResponse {
    let response = match CommandRequest::parse(body, content_type) {
        Ok(request) => lock(simulator).handle(&request),
        Err(e) => {
            warn!("Invalid simulator command request: {}", e);
            CommandResponse::error(None, &e)
        }
    };

    let status = if response.is_ok() { 200 } else { 400 };
    HttpResponse::json(status, &response)
}

fn read_resource(simulator: &Mutex<Simulator>, path: &str) -> Option<HttpResponse> {
    let mut simulator = lock(simulator);

    let response = match path {
        "/simulator/statistics" => HttpResponse::ok(&simulator.statistics()),
        "/fdm" => HttpResponse::ok(&simulator.fdm_data()),
        "/fdm/position" => HttpResponse::ok(&Position::from_model(simulator.model())),
        "/fdm/orientation" => HttpResponse::ok(&Orientation::from_model(simulator.model())),
        "/fdm/velocities" => HttpResponse::ok(&Velocities::from_model(simulator.model())),
        "/fdm/accelerations" => HttpResponse::ok(&Accelerations::from_model(simulator.model())),
        "/fdm/atmosphere" => HttpResponse::ok(&Atmosphere::from_model(simulator.model())),
        "/aircraft" => HttpResponse::ok(&AircraftInfo {
            aircraft: simulator.aircraft(),
        }),
        "/aircraft/gps" => HttpResponse::ok(&Gps::from_model(simulator.model())),
        "/aircraft/accelerometer" => {
            HttpResponse::ok(&simulator.measure(|sensors, model| sensors.accelerometer.measure(model)))
        }
        "/aircraft/gyroscope" => {
            HttpResponse::ok(&simulator.measure(|sensors, model| sensors.gyroscope.measure(model)))
        }
        "/aircraft/thermometer" => {
            HttpResponse::ok(&simulator.measure(|sensors, model| sensors.thermometer.measure(model)))
        }
        "/aircraft/pressure_sensor" => HttpResponse::ok(
            &simulator.measure(|sensors, model| sensors.pressure_sensor.measure(model)),
        ),
        "/aircraft/pitot_tube" => {
            HttpResponse::ok(&simulator.measure(|sensors, model| sensors.pitot_tube.measure(model)))
        }
        "/aircraft/ins" => HttpResponse::ok(
            &simulator.measure(|sensors, model| sensors.inertial_navigation_system.measure(model)),
        ),
        "/aircraft/engine" => HttpResponse::ok(&Engine::from_model(simulator.model())),
        "/aircraft/flight_controls" => HttpResponse::ok(&Controls::from_model(simulator.model())),
        _ => return None,
    };

    Some(response)
}

/// Blocking HTTP server for the REST interface.
pub struct WebServer {
    server: Server,
}

impl WebServer {
    pub fn bind(address: &str) -> Result<Self, SimulatorError> {
        let server = Server::http(address).map_err(std::io::Error::other)?;
        Ok(WebServer { server })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serves requests on the calling thread until `cancel` is triggered.
    pub fn serve(
        &self,
        simulator: &Mutex<Simulator>,
        cancel: &CancellationToken,
    ) -> Result<(), SimulatorError> {
        if let Some(address) = self.local_addr() {
            info!("Web server listening on {}", address);
        }

        while !cancel.is_cancelled() {
            match self.server.recv_timeout(POLL_INTERVAL) {
                Ok(Some(request)) => respond(simulator, request),
                Ok(None) => {}
                Err(e) => {
                    error!("Web server failed to receive a request: {}", e);
                    return Err(e.into());
                }
            }
        }

        info!("Web server stopped");
        Ok(())
    }
}

fn respond(simulator: &Mutex<Simulator>, mut request: Request) {
    let mut body = Vec::new();
    let response = match request.as_reader().read_to_end(&mut body) {
        Ok(_) => {
            let content_type = request
                .headers()
                .iter()
                .find(|header| header.field.equiv("Content-Type"))
                .map(|header| header.value.as_str().to_string());
            route(
                simulator,
                request.method(),
                request.url(),
                &body,
                content_type.as_deref(),
            )
        }
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            HttpResponse::error(400, "unreadable body")
        }
    };

    debug!(
        "{} {} -> {}",
        request.method(),
        request.url(),
        response.status
    );

    let mut reply = Response::from_string(response.body).with_status_code(response.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        reply = reply.with_header(header);
    }
    if let Err(e) = request.respond(reply) {
        warn!("Failed to send response: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpStream;
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;
    use crate::configuration::Configuration;
    use crate::fdm::property::Property;
    use crate::tests::stub_model::StubModel;

    fn shared_simulator() -> Mutex<Simulator> {
        let model = StubModel::new()
            .with(Property::Latitude, 37.9)
            .with(Property::Longitude, 23.9)
            .with(Property::TrueAirspeed, 60.0)
            .with(Property::Thrust, 100.0)
            .with(Property::EngineRpm, 2400.0);
        let configuration = Configuration {
            dt: 0.01,
            seed: Some(5),
            ..Default::default()
        };
        Mutex::new(Simulator::new(Box::new(model), &configuration).unwrap())
    }

    fn get(simulator: &Mutex<Simulator>, path: &str) -> (u16, Value) {
        let response = route(simulator, &Method::Get, path, b"", None);
        (response.status, serde_json::from_str(&response.body).unwrap())
    }

    fn post(simulator: &Mutex<Simulator>, body: &str) -> (u16, Value) {
        let response = route(simulator, &Method::Post, "/simulator", body.as_bytes(), None);
        (response.status, serde_json::from_str(&response.body).unwrap())
    }

    #[test]
    fn reports_simulator_status() {
        let simulator = shared_simulator();

        let (status, json) = get(&simulator, "/simulator");

        assert_eq!(status, 200);
        assert_eq!(json["running"], false);
        assert_eq!(json["paused"], true);
        assert_eq!(json["crashed"], false);
        assert_eq!(json["dt"], 0.01);
    }

    #[test]
    fn executes_form_commands() {
        let simulator = shared_simulator();

        let (status, json) = post(&simulator, "command=resume");

        assert_eq!(status, 200);
        assert_eq!(json, serde_json::json!({"result": "ok", "command": "resume"}));
        assert!(!lock(&simulator).is_paused());
    }

    #[test]
    fn executes_json_commands() {
        let simulator = shared_simulator();
        let time = lock(&simulator).time();

        let (status, json) = post(&simulator, r#"{"command":"run_for","time_to_run":0.1}"#);

        assert_eq!(status, 200);
        assert_eq!(json["command"], "run_for");
        approx::assert_relative_eq!(lock(&simulator).time(), time + 0.1, epsilon = 1e-9);
    }

    #[test]
    fn rejects_unknown_command_with_bad_request() {
        let simulator = shared_simulator();

        let (status, json) = post(&simulator, "command=takeoff");

        assert_eq!(status, 400);
        assert_eq!(json["result"], "error");
        assert_eq!(json["command"], "takeoff");
        assert_eq!(json["reason"], "unknown command");
    }

    #[test]
    fn rejects_run_for_without_time() {
        let simulator = shared_simulator();

        let (status, json) = post(&simulator, "command=run_for");

        assert_eq!(status, 400);
        assert_eq!(json["reason"], "no time to run provided");
    }

    #[test]
    fn rejects_request_without_command() {
        let simulator = shared_simulator();

        let (status, json) = post(&simulator, "");

        assert_eq!(status, 400);
        assert_eq!(json["result"], "error");
        assert!(json.get("command").is_none());
    }

    #[test]
    fn serves_fdm_data() {
        let simulator = shared_simulator();

        let (status, json) = get(&simulator, "/fdm");

        assert_eq!(status, 200);
        assert_eq!(json["latitude"], 37.9);
        for field in ["time", "dt", "total_pressure", "climb_rate", "throttle"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn serves_fdm_entities() {
        let simulator = shared_simulator();

        for (path, field) in [
            ("/fdm/position", "altitude"),
            ("/fdm/orientation", "yaw"),
            ("/fdm/velocities", "climb_rate"),
            ("/fdm/accelerations", "p_dot"),
            ("/fdm/atmosphere", "density"),
        ] {
            let (status, json) = get(&simulator, path);
            assert_eq!(status, 200, "{}", path);
            assert!(json.get(field).is_some(), "{} has no {}", path, field);
        }
    }

    #[test]
    fn serves_aircraft_instruments() {
        let simulator = shared_simulator();

        let (_, aircraft) = get(&simulator, "/aircraft");
        assert_eq!(aircraft["type"], "c172p");

        let (_, engine) = get(&simulator, "/aircraft/engine");
        assert_eq!(engine["rpm"], 2400.0);

        for (path, field) in [
            ("/aircraft/gps", "airspeed"),
            ("/aircraft/accelerometer", "z"),
            ("/aircraft/gyroscope", "yaw_rate"),
            ("/aircraft/thermometer", "temperature"),
            ("/aircraft/pressure_sensor", "static_pressure"),
            ("/aircraft/pitot_tube", "total_pressure"),
            ("/aircraft/ins", "heading"),
            ("/aircraft/flight_controls", "aileron"),
        ] {
            let (status, json) = get(&simulator, path);
            assert_eq!(status, 200, "{}", path);
            assert!(json.get(field).is_some(), "{} has no {}", path, field);
        }
    }

    #[test]
    fn ignores_query_and_trailing_slash() {
        let simulator = shared_simulator();

        let (status, _) = get(&simulator, "/fdm/position/?units=si");

        assert_eq!(status, 200);
    }

    #[test]
    fn unknown_path_is_not_found() {
        let simulator = shared_simulator();

        let (status, json) = get(&simulator, "/weather");

        assert_eq!(status, 404);
        assert_eq!(json["error"], "not found");
    }

    #[test]
    fn wrong_method_is_not_allowed() {
        let simulator = shared_simulator();

        assert_eq!(route(&simulator, &Method::Post, "/fdm", b"", None).status, 405);
        assert_eq!(route(&simulator, &Method::Delete, "/simulator", b"", None).status, 405);
    }

    #[test]
    fn serves_over_http() {
        let simulator = Arc::new(shared_simulator());
        let server = WebServer::bind("127.0.0.1:0").unwrap();
        let address = server.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let handle = {
            let simulator = simulator.clone();
            let cancel = cancel.clone();
            std::thread::spawn(move || server.serve(&simulator, &cancel))
        };

        let mut stream = TcpStream::connect(address).unwrap();
        let body = "command=pause";
        write!(
            stream,
            "POST /simulator HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        cancel.cancel();
        handle.join().unwrap().unwrap();

        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(response.ends_with(r#"{"result":"ok","command":"pause"}"#));
    }
}
