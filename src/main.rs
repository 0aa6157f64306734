fn main() {
    deeplie_lib::run()
}
