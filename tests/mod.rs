mod feed_fetcher_mock;

// This file organizes the integration tests into a cohesive test suite.
// Each module tests a specific aspect of the application:
// - smoke_tests: configuration and component wiring without Discord
// - event_store_mock: full sync passes against an in-memory event store
// - feed_fetcher_mock: the HTTP feed fetcher against a mock server
