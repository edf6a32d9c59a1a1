// Declare modules within the adapters directory
pub mod grpc_user_directory;
pub mod in_memory_event_bus;
pub mod in_memory_user_directory;
pub mod rabbitmq_event_bus;
