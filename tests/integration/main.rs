// Integration test suite for QueryOps
//
// Organized into focused modules by surface area. All modules share the
// common::TestClient for DB lifecycle management; stream tests run against
// the asynchronous local client.


mod bus_events;
mod campaigns;
mod logger;
mod system;
