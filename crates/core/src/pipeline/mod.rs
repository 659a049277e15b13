pub mod analyze_stream_use_case;
pub mod concurrency_guard;
pub mod frame_gate;
pub mod inference_dispatcher;
pub mod infrastructure;
pub mod pipeline_config;
pub mod pipeline_event;
pub mod result_aggregator;
