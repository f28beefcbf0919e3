mod tests_engine_api;
mod tests_scenarios;
