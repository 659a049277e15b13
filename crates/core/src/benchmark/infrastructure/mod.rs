pub mod proc_resource_probe;
