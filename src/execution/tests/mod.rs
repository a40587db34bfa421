mod assembly;
mod state_machine;
