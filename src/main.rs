fn main() {
    voxel_pipeline::cli::run();
}
