mod heartbeat_loop;
mod jobs;
mod sessions;
