// Include the generated code for the userdirectory package
pub mod userdirectory {
    tonic::include_proto!("userdirectory");
}

// Include the generated code for the notificationquery package
pub mod notificationquery {
    tonic::include_proto!("notificationquery");
}
